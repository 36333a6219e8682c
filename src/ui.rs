use anyhow::Result;
use chrono::Local;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use family_basket::{ActionError, ListState, Services};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState, Wrap},
    Frame, Terminal,
};
use std::io;
use tokio::runtime::Runtime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Browse,
    Adding,
    ConfirmClear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone)]
pub struct Notice {
    pub level: Level,
    pub text: String,
}

/// Work that blocks on I/O; run after the next draw so the screen shows progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    Recipe,
}

pub struct App<'a> {
    services: &'a Services,
    runtime: &'a Runtime,
    pub list: ListState,
    pub state: TableState,
    pub mode: Mode,
    pub owner_index: usize,
    pub input: String,
    pub notice: Option<Notice>,
    pub recipe: Option<String>,
    pending: Option<Pending>,
}

impl<'a> App<'a> {
    pub fn new(services: &'a Services, runtime: &'a Runtime) -> Self {
        let list = runtime.block_on(services.open());

        let mut app = Self {
            services,
            runtime,
            list,
            state: TableState::default(),
            mode: Mode::Browse,
            owner_index: 0,
            input: String::new(),
            notice: None,
            recipe: None,
            pending: None,
        };
        app.after_reload();
        if app.list.is_degraded() {
            app.warn("목록을 불러오지 못해 빈 목록을 보여 줍니다".to_string());
        }
        app
    }

    fn info(&mut self, text: String) {
        self.notice = Some(Notice { level: Level::Info, text });
    }

    fn warn(&mut self, text: String) {
        self.notice = Some(Notice { level: Level::Warn, text });
    }

    fn fail(&mut self, error: &ActionError) {
        self.notice = Some(Notice {
            level: Level::Error,
            text: error.user_message(),
        });
    }

    fn after_reload(&mut self) {
        let len = self.list.entries().len();
        match self.state.selected() {
            _ if len == 0 => self.state.select(None),
            Some(i) if i >= len => self.state.select(Some(len - 1)),
            None => self.state.select(Some(0)),
            _ => {}
        }
    }

    pub fn owner_label(&self) -> &str {
        let members = self.services.household().members();
        members
            .get(self.owner_index % members.len().max(1))
            .map(|m| m.label.as_str())
            .unwrap_or(family_basket::DEFAULT_OWNER_LABEL)
    }

    pub fn next_owner(&mut self) {
        let count = self.services.household().members().len().max(1);
        self.owner_index = (self.owner_index + 1) % count;
    }

    pub fn next(&mut self) {
        let len = self.list.entries().len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(i) if i + 1 < len => i + 1,
            _ => 0,
        };
        self.state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let len = self.list.entries().len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        self.state.select(Some(i));
    }

    pub fn toggle_selected(&mut self) {
        if let Some(i) = self.state.selected() {
            if let Err(e) = self.list.toggle(i) {
                self.fail(&ActionError::from(e));
            }
        }
    }

    pub fn submit_item(&mut self) {
        let owner = self.owner_label().to_string();
        let name = self.input.clone();

        match self.runtime.block_on(self.services.add(&mut self.list, &owner, &name)) {
            Ok(entry) => {
                self.input.clear();
                self.mode = Mode::Browse;
                self.state.select(Some(self.list.entries().len() - 1));
                self.info(format!("{}: {} 추가했습니다", entry.owner, entry.name));
            }
            Err(e) => {
                self.fail(&e);
                self.after_reload();
            }
        }
    }

    pub fn delete_selected(&mut self) {
        let Some(i) = self.state.selected() else {
            return;
        };

        match self.runtime.block_on(self.services.delete(&mut self.list, i)) {
            Ok(entry) => self.info(format!("{} 삭제했습니다", entry.name)),
            Err(e) => self.fail(&e),
        }
        self.after_reload();
    }

    pub fn clear_all(&mut self) {
        self.mode = Mode::Browse;
        match self.runtime.block_on(self.services.clear(&mut self.list)) {
            Ok(()) => self.info("목록을 비웠습니다".to_string()),
            Err(e) => self.fail(&e),
        }
        self.after_reload();
    }

    pub fn refresh(&mut self) {
        self.runtime.block_on(self.services.refresh(&mut self.list));
        self.after_reload();
        if self.list.is_degraded() {
            self.warn("목록을 불러오지 못해 빈 목록을 보여 줍니다".to_string());
        } else {
            self.info("새로 불러왔습니다".to_string());
        }
    }

    fn request_recipe(&mut self) {
        if self.list.selected_names().is_empty() {
            self.fail(&ActionError::Recipe(family_basket::RecipeError::EmptySelection));
            return;
        }
        self.info("레시피를 요청하는 중...".to_string());
        self.pending = Some(Pending::Recipe);
    }

    fn run_pending(&mut self) {
        match self.pending.take() {
            Some(Pending::Recipe) => {
                let today = Local::now().date_naive();
                match self.runtime.block_on(self.services.recipe(&self.list, today)) {
                    Ok(text) => {
                        self.recipe = Some(text);
                        self.info("레시피가 준비됐습니다 (x: 닫기)".to_string());
                    }
                    Err(e) => self.fail(&e),
                }
            }
            None => {}
        }
    }

    /// Apply one key press. Returns true when the app should quit.
    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        match self.mode {
            Mode::Adding => match key.code {
                KeyCode::Esc => {
                    self.mode = Mode::Browse;
                    self.input.clear();
                }
                KeyCode::Enter => self.submit_item(),
                KeyCode::Tab => self.next_owner(),
                KeyCode::Backspace => {
                    self.input.pop();
                }
                KeyCode::Char(c) => self.input.push(c),
                _ => {}
            },
            Mode::ConfirmClear => match key.code {
                KeyCode::Char('y') => self.clear_all(),
                _ => self.mode = Mode::Browse,
            },
            Mode::Browse => match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return true,
                KeyCode::Char('a') => {
                    self.mode = Mode::Adding;
                    self.notice = None;
                }
                KeyCode::Char(' ') => self.toggle_selected(),
                KeyCode::Char('d') | KeyCode::Delete => self.delete_selected(),
                KeyCode::Char('C') => self.mode = Mode::ConfirmClear,
                KeyCode::Char('r') => self.request_recipe(),
                KeyCode::Char('R') | KeyCode::F(5) => self.refresh(),
                KeyCode::Char('x') => self.recipe = None,
                KeyCode::Down | KeyCode::Char('j') => self.next(),
                KeyCode::Up | KeyCode::Char('k') => self.previous(),
                KeyCode::Home => {
                    if !self.list.entries().is_empty() {
                        self.state.select(Some(0));
                    }
                }
                KeyCode::End => {
                    if !self.list.entries().is_empty() {
                        self.state.select(Some(self.list.entries().len() - 1));
                    }
                }
                _ => {}
            },
        }
        false
    }
}

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run the app
    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("오류: {:?}", err);
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(terminal: &mut Terminal<B>, app: &mut App) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if app.pending.is_some() {
            app.run_pending();
            continue;
        }

        if let Event::Key(key) = event::read()? {
            if key.kind == KeyEventKind::Press && app.handle_key(key) {
                return Ok(());
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(0),    // List (+ recipe)
            Constraint::Length(3), // Input / status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    if app.recipe.is_some() {
        let content_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
            .split(chunks[1]);

        render_table(f, content_chunks[0], app);
        render_recipe(f, content_chunks[1], app);
    } else {
        render_table(f, chunks[1], app);
    }

    render_status_bar(f, chunks[2], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let total = app.list.entries().len();
    let checked = app.list.selected_names().len();

    let spans = vec![
        Span::styled(
            "🛒 우리 가족 장바구니",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        ),
        Span::raw("  |  "),
        Span::styled(format!("항목: {}", total), Style::default().fg(Color::White)),
        Span::raw("  "),
        Span::styled(format!("✓ {}", checked), Style::default().fg(Color::Green)),
        Span::raw("  |  "),
        Span::styled(app.services.store().describe(), Style::default().fg(Color::DarkGray)),
    ];

    let header = Paragraph::new(vec![Line::from(spans)])
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));

    f.render_widget(header, area);
}

fn render_table(f: &mut Frame, area: Rect, app: &mut App) {
    let household = app.services.household();

    let header_cells = ["", "", "누구", "상품"].iter().map(|h| {
        Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
    });
    let header = Row::new(header_cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1);

    let rows: Vec<Row> = app
        .list
        .entries()
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let (mark, style) = if app.list.is_selected(i) {
                ("[x]", Style::default().fg(Color::Green))
            } else {
                ("[ ]", Style::default())
            };

            Row::new(vec![
                Cell::from(mark).style(style),
                Cell::from(household.glyph_for(&entry.owner).to_string()),
                Cell::from(entry.owner.label().to_string()),
                Cell::from(entry.name.clone()).style(style),
            ])
            .height(1)
        })
        .collect();

    let title = if rows.is_empty() {
        " 장바구니가 비어 있습니다 (a: 추가) "
    } else {
        " 장보기 목록 "
    };

    let table = Table::new(
        rows,
        [
            Constraint::Length(4),
            Constraint::Length(3),
            Constraint::Length(10),
            Constraint::Min(10),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(title),
    )
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn render_recipe(f: &mut Frame, area: Rect, app: &App) {
    let text = app.recipe.clone().unwrap_or_default();
    let panel = Paragraph::new(text)
        .wrap(Wrap { trim: false })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Magenta))
                .title(" 👨‍🍳 추천 레시피 "),
        );

    f.render_widget(panel, area);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let line = match app.mode {
        Mode::Adding => Line::from(vec![
            Span::styled(
                format!(
                    "{} {} ",
                    app.services
                        .household()
                        .glyph_for(&family_basket::Owner::from_label(app.owner_label())),
                    app.owner_label()
                ),
                Style::default().fg(Color::Yellow),
            ),
            Span::raw(format!("> {}▏", app.input)),
            Span::styled("   Tab: 누구  Enter: 추가  Esc: 취소", Style::default().fg(Color::DarkGray)),
        ]),
        Mode::ConfirmClear => Line::from(Span::styled(
            "목록을 모두 지울까요? (y: 확인)",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        )),
        Mode::Browse => match &app.notice {
            Some(notice) => {
                let color = match notice.level {
                    Level::Info => Color::Green,
                    Level::Warn => Color::Yellow,
                    Level::Error => Color::Red,
                };
                Line::from(Span::styled(notice.text.clone(), Style::default().fg(color)))
            }
            None => Line::from(Span::styled(
                "a: 추가  space: 선택  d: 삭제  C: 비우기  r: 레시피  R: 새로고침  q: 종료",
                Style::default().fg(Color::DarkGray),
            )),
        },
    };

    let bar = Paragraph::new(vec![line]).block(Block::default().borders(Borders::ALL));
    f.render_widget(bar, area);
}
