// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{bail, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::runtime::Runtime;

use family_basket::{logging, AppConfig, ListState, Services};

#[derive(Parser)]
#[command(name = "family-basket", version, about = "가족이 함께 쓰는 장보기 목록")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive list (default)
    Tui,
    /// Print the list
    List,
    /// Add an item
    Add {
        /// Household member the item is for
        #[arg(short, long, default_value = "")]
        owner: String,
        name: String,
    },
    /// Remove the item at a 1-based position
    Remove { number: usize },
    /// Remove every item
    Clear,
    /// Suggest a recipe for the items at the given 1-based positions
    Recipe {
        #[arg(required = true)]
        numbers: Vec<usize>,
    },
    /// Show household members and their glyphs
    Members,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::from_env()?;

    let command = cli.command.unwrap_or(Command::Tui);
    if matches!(command, Command::Tui) && config.logging.file.is_none() {
        // stderr belongs to the terminal UI
        config.logging.file = Some(PathBuf::from("family-basket.log"));
    }
    logging::init(&config.logging)?;

    let runtime = Runtime::new()?;
    let services = config.build_services()?;

    match command {
        Command::Tui => run_ui_mode(&runtime, &services),
        Command::List => runtime.block_on(run_list(&services)),
        Command::Add { owner, name } => runtime.block_on(run_add(&services, &owner, &name)),
        Command::Remove { number } => runtime.block_on(run_remove(&services, number)),
        Command::Clear => runtime.block_on(run_clear(&services)),
        Command::Recipe { numbers } => runtime.block_on(run_recipe(&services, &numbers)),
        Command::Members => {
            run_members(&services);
            Ok(())
        }
    }
}

fn print_list(services: &Services, state: &ListState) {
    if state.is_degraded() {
        println!("⚠️  목록을 불러오지 못했습니다: {}", services.store().describe());
    }
    if state.entries().is_empty() {
        println!("🛒 장바구니가 비어 있습니다");
        return;
    }

    for (i, entry) in state.entries().iter().enumerate() {
        println!(
            "{:>3}. {} {:<8} {}",
            i + 1,
            services.household().glyph_for(&entry.owner),
            entry.owner.label(),
            entry.name
        );
    }
}

/// Turn a 1-based position from the command line into a list index
fn to_index(number: usize, state: &ListState) -> Result<usize> {
    if number == 0 || number > state.entries().len() {
        bail!("{}번 항목이 없습니다. (목록에 {}개)", number, state.entries().len());
    }
    Ok(number - 1)
}

async fn run_list(services: &Services) -> Result<()> {
    let state = services.open().await;
    println!("🛒 우리 가족 장바구니 ({})", services.store().describe());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    print_list(services, &state);
    Ok(())
}

async fn run_add(services: &Services, owner: &str, name: &str) -> Result<()> {
    let mut state = services.open().await;
    match services.add(&mut state, owner, name).await {
        Ok(entry) => {
            println!(
                "✓ 추가했습니다 {} {}: {}",
                services.household().glyph_for(&entry.owner),
                entry.owner,
                entry.name
            );
            Ok(())
        }
        Err(e) => bail!("{}", e.user_message()),
    }
}

async fn run_remove(services: &Services, number: usize) -> Result<()> {
    let mut state = services.open().await;
    let index = to_index(number, &state)?;
    match services.delete(&mut state, index).await {
        Ok(entry) => {
            println!("✓ {} 삭제했습니다", entry.name);
            Ok(())
        }
        Err(e) => bail!("{}", e.user_message()),
    }
}

async fn run_clear(services: &Services) -> Result<()> {
    let mut state = services.open().await;
    match services.clear(&mut state).await {
        Ok(()) => {
            println!("✓ 목록을 비웠습니다");
            Ok(())
        }
        Err(e) => bail!("{}", e.user_message()),
    }
}

async fn run_recipe(services: &Services, numbers: &[usize]) -> Result<()> {
    let mut state = services.open().await;
    for &number in numbers {
        let index = to_index(number, &state)?;
        if !state.is_selected(index) {
            state.toggle(index)?;
        }
    }

    println!("👨‍🍳 레시피 요청 중: {}", state.selected_names().join(", "));
    match services.recipe(&state, Local::now().date_naive()).await {
        Ok(text) => {
            println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");
            println!("{}", text);
            Ok(())
        }
        Err(e) => bail!("{}", e.user_message()),
    }
}

fn run_members(services: &Services) {
    let household = services.household();
    println!("👪 우리 가족");
    for member in household.members() {
        println!("   {} {}", member.glyph, member.label);
    }
    println!("   {} {} (주인 없음)", household.default_glyph(), family_basket::DEFAULT_OWNER_LABEL);
}

#[cfg(feature = "tui")]
fn run_ui_mode(runtime: &Runtime, services: &Services) -> Result<()> {
    println!("🛒 우리 가족 장바구니를 여는 중...\n");
    println!("📋 저장소: {}", services.store().describe());

    let mut app = ui::App::new(services, runtime);
    ui::run_ui(&mut app)?;

    println!("\n✅ 종료했습니다");

    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_runtime: &Runtime, _services: &Services) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use the command line: family-basket list | add | remove | recipe");
    eprintln!("   Or the web widget: cargo run --bin basket-server --features server");
    std::process::exit(1);
}
