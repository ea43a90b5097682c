// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! fangov-tui: read-only terminal dashboard for the fan governor daemon.

use clap::Parser;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use fan_governor::config::{self, Config};
use fan_governor::curve::DutyCurve;
use fan_governor::emergency::EmergencyConfig;
use fan_governor::metrics::TickSnapshot;
use fan_governor::protocol::{self, Request, Response};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Gauge, Paragraph, Row, Table, Tabs},
};
use std::io::{self, BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::time::Duration;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "fangov-tui", about = "Fan governor dashboard")]
struct Cli {
    /// Path to the daemon socket.
    #[arg(short, long, default_value = config::DEFAULT_SOCKET_PATH)]
    socket: String,
}

// ---------------------------------------------------------------------------
// App state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tab {
    Dashboard,
    Curve,
}

impl Tab {
    const ALL: [Tab; 2] = [Tab::Dashboard, Tab::Curve];

    fn index(self) -> usize {
        match self {
            Tab::Dashboard => 0,
            Tab::Curve => 1,
        }
    }

    fn title(self) -> &'static str {
        match self {
            Tab::Dashboard => "Dashboard",
            Tab::Curve => "Curve",
        }
    }
}

struct App {
    tab: Tab,
    running: bool,
    status_message: String,
    socket_path: String,
    connection: Option<Connection>,
    snapshot: Option<TickSnapshot>,
    config: Option<Config>,
}

struct Connection {
    stream: UnixStream,
    reader: BufReader<UnixStream>,
}

impl Connection {
    fn connect(path: &str) -> io::Result<Self> {
        let stream = UnixStream::connect(path)?;
        stream.set_read_timeout(Some(Duration::from_secs(2)))?;
        let reader = BufReader::new(stream.try_clone()?);
        Ok(Self { stream, reader })
    }

    fn send_request(&mut self, req: &Request) -> io::Result<Response> {
        let encoded = protocol::encode(req).map_err(|e| {
            io::Error::new(io::ErrorKind::InvalidData, format!("Encode error: {e}"))
        })?;
        self.stream.write_all(encoded.as_bytes())?;
        self.stream.flush()?;

        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "Daemon closed the connection",
            ));
        }
        protocol::decode(&line).map_err(|e| {
            io::Error::new(io::ErrorKind::InvalidData, format!("Decode error: {e}"))
        })
    }
}

impl App {
    fn new(socket_path: &str) -> Self {
        let mut app = Self {
            tab: Tab::Dashboard,
            running: true,
            status_message: String::new(),
            socket_path: socket_path.to_string(),
            connection: None,
            snapshot: None,
            config: None,
        };
        app.reconnect();
        app
    }

    fn reconnect(&mut self) {
        match Connection::connect(&self.socket_path) {
            Ok(c) => {
                log::info!("Connected to daemon at {}", self.socket_path);
                self.connection = Some(c);
                self.status_message.clear();
                self.refresh_config();
                self.refresh_status();
            }
            Err(e) => {
                log::error!("Could not connect to daemon: {e}");
                self.connection = None;
                self.status_message =
                    "Not connected to daemon. Is fangov-daemon running?".to_string();
            }
        }
    }

    fn request(&mut self, req: &Request) -> Option<Response> {
        let conn = self.connection.as_mut()?;
        match conn.send_request(req) {
            Ok(Response::Error { message }) => {
                self.status_message = format!("Error: {message}");
                None
            }
            Ok(resp) => Some(resp),
            Err(e) => {
                self.status_message = format!("Connection error: {e}");
                self.connection = None;
                None
            }
        }
    }

    fn refresh_status(&mut self) {
        if let Some(Response::Status { snapshot }) = self.request(&Request::GetStatus) {
            self.snapshot = snapshot;
        }
    }

    fn refresh_config(&mut self) {
        if let Some(Response::Config { config }) = self.request(&Request::GetConfig) {
            self.config = Some(*config);
        }
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(&cli.socket);

    let result = run_app(&mut terminal, &mut app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
) -> anyhow::Result<()> {
    let tick_rate = Duration::from_millis(500);

    while app.running {
        terminal.draw(|f| ui(f, app))?;

        if event::poll(tick_rate)? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                handle_input(app, key.code, key.modifiers);
            }
        } else {
            app.refresh_status();
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Input handling
// ---------------------------------------------------------------------------

fn handle_input(app: &mut App, key: KeyCode, modifiers: KeyModifiers) {
    match key {
        KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => app.running = false,
        KeyCode::Char('q') => app.running = false,
        KeyCode::Char('r') => {
            if app.connection.is_some() {
                app.refresh_config();
                app.refresh_status();
                if app.connection.is_some() {
                    app.status_message = "Refreshed".to_string();
                }
            } else {
                app.reconnect();
            }
        }
        KeyCode::Char('1') => app.tab = Tab::Dashboard,
        KeyCode::Char('2') => app.tab = Tab::Curve,
        KeyCode::Tab | KeyCode::BackTab => {
            let idx = (app.tab.index() + 1) % Tab::ALL.len();
            app.tab = Tab::ALL[idx];
        }
        _ => {}
    }
}

// ---------------------------------------------------------------------------
// UI rendering
// ---------------------------------------------------------------------------

fn ui(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // tab bar
            Constraint::Min(0),   // content
            Constraint::Length(3), // status bar
        ])
        .split(f.area());

    draw_tabs(f, app, chunks[0]);

    match app.tab {
        Tab::Dashboard => draw_dashboard(f, app, chunks[1]),
        Tab::Curve => draw_curve(f, app, chunks[1]),
    }

    draw_status_bar(f, app, chunks[2]);
}

fn draw_tabs(f: &mut Frame, app: &App, area: Rect) {
    let titles: Vec<Line> = Tab::ALL.iter().map(|t| Line::from(t.title())).collect();

    let title = match &app.snapshot {
        Some(s) => format!(" fangov: {} ", s.host),
        None => " fangov ".to_string(),
    };

    let tabs = Tabs::new(titles)
        .block(Block::default().borders(Borders::ALL).title(title))
        .select(app.tab.index())
        .style(Style::default().fg(Color::Gray))
        .highlight_style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        );

    f.render_widget(tabs, area);
}

fn draw_status_bar(f: &mut Frame, app: &App, area: Rect) {
    let connected = if app.connection.is_some() {
        Span::styled(" CONNECTED ", Style::default().fg(Color::Green).bold())
    } else {
        Span::styled(" DISCONNECTED ", Style::default().fg(Color::Red).bold())
    };

    let msg = Span::raw(format!("  {}", app.status_message));
    let help = " [Tab/1/2]switch  [r]efresh  [q]uit ";

    let status_line = Line::from(vec![connected, msg]);
    let help_line = Line::from(Span::styled(help, Style::default().fg(Color::DarkGray)));

    let paragraph = Paragraph::new(vec![status_line, help_line])
        .block(Block::default().borders(Borders::ALL));

    f.render_widget(paragraph, area);
}

fn draw_dashboard(f: &mut Frame, app: &App, area: Rect) {
    let Some(snapshot) = &app.snapshot else {
        let waiting = Paragraph::new("Waiting for the first tick...")
            .block(Block::default().borders(Borders::ALL).title(" Status "));
        f.render_widget(waiting, area);
        return;
    };

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)])
        .split(area);

    // Mode banner
    let (mode, color) = mode_label(snapshot);
    let crit = snapshot
        .critical_temp
        .map(|t| format!("{t:.1}°C"))
        .unwrap_or_else(|| "-".to_string());
    let banner = Paragraph::new(Line::from(vec![
        Span::styled(format!(" {mode} "), Style::default().fg(Color::Black).bg(color).bold()),
        Span::raw(format!(
            "  tick {}  critical {crit} ({})",
            snapshot.tick, snapshot.trend
        )),
    ]))
    .block(Block::default().borders(Borders::ALL).title(" Mode "));
    f.render_widget(banner, rows[0]);

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(rows[1]);

    draw_banks(f, snapshot, chunks[0]);
    draw_temperatures(f, app, snapshot, chunks[1]);
}

fn draw_banks(f: &mut Frame, snapshot: &TickSnapshot, area: Rect) {
    let block = Block::default().borders(Borders::ALL).title(" Fan Banks ");
    let inner = block.inner(area);
    f.render_widget(block, area);

    let slots = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            snapshot
                .banks
                .iter()
                .map(|_| Constraint::Length(3))
                .chain(std::iter::once(Constraint::Min(0))),
        )
        .split(inner);

    for (bank, slot) in snapshot.banks.iter().zip(slots.iter()) {
        let color = match bank.duty {
            d if d >= 90 => Color::Red,
            d if d >= 50 => Color::Yellow,
            _ => Color::Green,
        };
        let marker = if bank.applied { " (written)" } else { "" };
        let gauge = Gauge::default()
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(format!(" Bank {}{marker} ", bank.bank)),
            )
            .gauge_style(Style::default().fg(color))
            .percent(u16::from(bank.duty.min(100)))
            .label(format!("{}%", bank.duty));
        f.render_widget(gauge, *slot);
    }
}

fn draw_temperatures(f: &mut Frame, app: &App, snapshot: &TickSnapshot, area: Rect) {
    let emergency = app.config.as_ref().map(|c| &c.emergency);

    let temp_rows: Vec<Row> = snapshot
        .temperatures
        .iter()
        .map(|(name, &t)| {
            let (high, low) = thresholds(emergency, name);
            let value = Span::styled(
                format!("{t:.1}°C"),
                Style::default().fg(temp_color(t, high, low)),
            );
            Row::new(vec![
                Cell::from(name.clone()),
                Cell::from(value),
                Cell::from(format!("{low:.0} / {high:.0}")),
            ])
        })
        .collect();

    let temp_table = Table::new(
        temp_rows,
        [
            Constraint::Percentage(40),
            Constraint::Percentage(30),
            Constraint::Percentage(30),
        ],
    )
    .header(
        Row::new(vec!["Sensor", "Temp", "Low / High"])
            .style(Style::default().fg(Color::Cyan).bold()),
    )
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(" Temperatures "),
    );

    f.render_widget(temp_table, area);
}

fn draw_curve(f: &mut Frame, app: &App, area: Rect) {
    let lines = match &app.config {
        Some(config) => match DutyCurve::build(&config.curve, config.control.min_duty) {
            Ok(curve) => {
                let marker = app.snapshot.as_ref().and_then(|s| s.critical_temp);
                let mut lines = render_curve_graph(&curve, marker);
                lines.push(Line::from(""));
                lines.push(Line::from("  Boosts (critical sensor, not falling):"));
                for target in &config.boost.targets {
                    let rules = target
                        .rules
                        .iter()
                        .map(|r| format!("{:.0}°C +{}%", r.temp_c, r.boost))
                        .collect::<Vec<_>>()
                        .join(", ");
                    lines.push(Line::from(format!(
                        "    bank {} above {:.0}°C: {rules}",
                        target.bank, target.above
                    )));
                }
                lines
            }
            Err(e) => vec![Line::from(format!("Invalid curve: {e}"))],
        },
        None => vec![Line::from("No configuration received from daemon")],
    };

    let preview = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title(" Duty Curve "),
    );
    f.render_widget(preview, area);
}

fn render_curve_graph(curve: &DutyCurve, marker: Option<f64>) -> Vec<Line<'static>> {
    let graph_height = 11usize;
    let graph_width = 50usize;

    let mut lines = Vec::new();
    lines.push(Line::from(format!("  Floor: {}%", curve.min_duty())));
    lines.push(Line::from(""));

    let mut grid = vec![vec![' '; graph_width]; graph_height];

    let segments = curve.segments();
    let min_temp = segments.first().map(|s| s.breakpoint).unwrap_or(0.0);
    let max_temp = segments.last().map(|s| s.breakpoint).unwrap_or(100.0) + 10.0;
    let temp_range = (max_temp - min_temp).max(1.0);

    for x in 0..graph_width {
        let temp = min_temp + (x as f64 / graph_width as f64) * temp_range;
        let duty = curve.interpolate(temp);
        let y = ((duty as f64 / 100.0) * (graph_height - 1) as f64).round() as usize;
        let y = y.min(graph_height - 1);
        let row = graph_height - 1 - y; // Invert for display
        grid[row][x] = '█';
    }

    if let Some(t) = marker.filter(|t| (min_temp..max_temp).contains(t)) {
        let x = (((t - min_temp) / temp_range) * graph_width as f64) as usize;
        for row in grid.iter_mut() {
            if row[x.min(graph_width - 1)] == ' ' {
                row[x.min(graph_width - 1)] = '│';
            }
        }
    }

    for (i, row) in grid.iter().enumerate() {
        let duty_label = 100 - (i * 100 / (graph_height - 1));
        let row_str: String = row.iter().collect();
        lines.push(Line::from(format!("  {duty_label:>3}% │{row_str}")));
    }

    lines.push(Line::from(format!("       └{}", "─".repeat(graph_width))));
    lines.push(Line::from(format!(
        "        {min_temp:.0}°C{:>width$}{max_temp:.0}°C",
        "",
        width = graph_width - 8
    )));

    lines
}

fn mode_label(snapshot: &TickSnapshot) -> (&'static str, Color) {
    if snapshot.emergency {
        ("EMERGENCY", Color::Red)
    } else if snapshot.sensor_fault {
        ("SENSOR FAULT", Color::Magenta)
    } else {
        ("NORMAL", Color::Green)
    }
}

fn thresholds(config: Option<&EmergencyConfig>, sensor: &str) -> (f64, f64) {
    let defaults = EmergencyConfig::default();
    let config = config.unwrap_or(&defaults);
    match config.sensors.get(sensor) {
        Some(t) => (t.high, t.low),
        None => (config.high, config.low),
    }
}

fn temp_color(temp: f64, high: f64, low: f64) -> Color {
    if temp > high {
        Color::Red
    } else if temp > low {
        Color::Yellow
    } else {
        Color::Green
    }
}
