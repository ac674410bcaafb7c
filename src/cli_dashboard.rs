//! Progress (current task state and gauge)
//! Task (raw task fields)
//! Log (message transitions and downloads)

use std::{
  error::Error,
  io,
  path::{Path, PathBuf},
  sync::mpsc,
  thread,
  time::{Duration, Instant},
};

use chrono::{DateTime, Local};
use clap::Parser;
use crossterm::{
  event::{self, DisableMouseCapture, EnableMouseCapture, Event as CEvent, KeyCode},
  execute,
  terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use imgharvest::models::{Task, TaskStatus};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::runtime::Runtime;
use tui::{
  backend::{Backend, CrosstermBackend},
  layout::{Constraint, Direction, Layout, Rect},
  style::{Color, Modifier, Style},
  text::{Span, Spans},
  widgets::{Block, Borders, Gauge, List, ListItem, Paragraph, Tabs},
  Terminal,
};

#[derive(Parser, Debug, Clone)]
#[command(name = "imgharvest_cli", about = "Submit an image scrape and watch it until the archive is ready")]
struct Args {
  /// Search query
  search: String,
  /// Number of images to collect
  #[arg(short = 'n', long, default_value_t = 20)]
  count: usize,
  #[arg(long, default_value = "http://localhost:4000")]
  server: String,
  /// Directory the finished archive is saved to
  #[arg(long, default_value = ".")]
  out: PathBuf,
  #[arg(long)]
  size: Option<String>,
  #[arg(long)]
  color: Option<String>,
  #[arg(long = "type")]
  image_type: Option<String>,
  #[arg(long)]
  time: Option<String>,
  #[arg(long)]
  user_rights: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Envelope {
  status: String,
  message: Option<String>,
  #[serde(default)]
  data: Value,
}

enum Update {
  Task(Task),
  Saved(PathBuf),
  Failed(String),
}

struct LogEntry {
  timestamp: DateTime<Local>,
  message: String,
}

#[derive(Clone, Copy)]
enum DashboardTab {
  Progress,
  Task,
  Log,
}

struct App {
  current_tab: DashboardTab,
  search: String,
  task: Option<Task>,
  logs: Vec<LogEntry>,
}

impl App {
  fn new(search: String) -> Self {
    Self {
      current_tab: DashboardTab::Progress,
      search,
      task: None,
      logs: vec![],
    }
  }

  fn next_tab(&mut self) {
    self.current_tab = match self.current_tab {
      DashboardTab::Progress => DashboardTab::Task,
      DashboardTab::Task => DashboardTab::Log,
      DashboardTab::Log => DashboardTab::Progress,
    }
  }

  fn previous_tab(&mut self) {
    self.current_tab = match self.current_tab {
      DashboardTab::Progress => DashboardTab::Log,
      DashboardTab::Task => DashboardTab::Progress,
      DashboardTab::Log => DashboardTab::Task,
    }
  }

  fn log(&mut self, message: String) {
    self.logs.insert(0, LogEntry { timestamp: Local::now(), message });
  }

  fn apply(&mut self, update: Update) {
    match update {
      Update::Task(task) => {
        let changed = self.task.as_ref().map_or(true, |old| old.msg != task.msg || old.status != task.status);
        if changed {
          self.log(format!("{:?}: {}", task.status, task.msg));
        }
        self.task = Some(task);
      }
      Update::Saved(path) => self.log(format!("Archive saved to {}", path.display())),
      Update::Failed(message) => self.log(format!("Error: {}", message)),
    }
  }
}

async fn send_request(client: &reqwest::Client, args: &Args) -> Result<Task, String> {
  let mut body = json!({ "search": args.search, "numOfImages": args.count });
  for (key, value) in [
    ("size", &args.size),
    ("color", &args.color),
    ("type", &args.image_type),
    ("time", &args.time),
    ("userRights", &args.user_rights),
  ] {
    if let Some(value) = value {
      body[key] = json!(value);
    }
  }

  let envelope: Envelope = client
    .post(format!("{}/scrape-google-images", args.server))
    .json(&body)
    .send()
    .await
    .map_err(|e| e.to_string())?
    .json()
    .await
    .map_err(|e| e.to_string())?;
  task_from(envelope)
}

async fn fetch_task(client: &reqwest::Client, server: &str, task_id: &str) -> Result<Task, String> {
  let envelope: Envelope = client
    .get(format!("{}/check-scraping-progress/{}", server, task_id))
    .send()
    .await
    .map_err(|e| e.to_string())?
    .json()
    .await
    .map_err(|e| e.to_string())?;
  task_from(envelope)
}

fn task_from(envelope: Envelope) -> Result<Task, String> {
  if envelope.status != "success" {
    return Err(envelope.message.unwrap_or(envelope.status));
  }
  serde_json::from_value(envelope.data).map_err(|e| e.to_string())
}

async fn save_archive(client: &reqwest::Client, server: &str, task_id: &str, out: &Path) -> Result<PathBuf, String> {
  let response = client
    .get(format!("{}/download-scraped-images/{}", server, task_id))
    .send()
    .await
    .map_err(|e| e.to_string())?;
  let is_zip = response
    .headers()
    .get(reqwest::header::CONTENT_TYPE)
    .is_some_and(|v| v.as_bytes() == b"application/zip");
  if !is_zip {
    return Err("archive is not available".into());
  }
  let bytes = response.bytes().await.map_err(|e| e.to_string())?;
  let path = out.join(format!("{}.zip", task_id));
  tokio::fs::write(&path, &bytes).await.map_err(|e| e.to_string())?;
  Ok(path)
}

async fn watch(args: Args, tx: mpsc::Sender<Update>) {
  let client = reqwest::Client::new();
  let mut task = match send_request(&client, &args).await {
    Ok(task) => task,
    Err(e) => {
      let _ = tx.send(Update::Failed(e));
      return;
    }
  };
  let task_id = task.task_id.to_string();

  loop {
    let _ = tx.send(Update::Task(task.clone()));
    if task.status.is_terminal() {
      break;
    }
    tokio::time::sleep(Duration::from_secs(1)).await;
    match fetch_task(&client, &args.server, &task_id).await {
      Ok(latest) => task = latest,
      Err(e) => {
        let _ = tx.send(Update::Failed(e));
        return;
      }
    }
  }

  if task.status == TaskStatus::Success {
    let update = match save_archive(&client, &args.server, &task_id, &args.out).await {
      Ok(path) => Update::Saved(path),
      Err(e) => Update::Failed(e),
    };
    let _ = tx.send(update);
  }
}

fn main() -> Result<(), Box<dyn Error>> {
  let args = Args::parse();
  let rt = Runtime::new()?;

  enable_raw_mode()?;
  let mut stdout = io::stdout();
  execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
  let backend = CrosstermBackend::new(stdout);
  let mut terminal = Terminal::new(backend)?;

  let (tx, rx) = mpsc::channel::<Update>();
  {
    let args = args.clone();
    thread::spawn(move || rt.block_on(watch(args, tx)));
  }

  let mut app = App::new(args.search.clone());
  let tick_rate = Duration::from_millis(250);
  let mut last_tick = Instant::now();

  loop {
    while let Ok(update) = rx.try_recv() {
      app.apply(update);
    }
    terminal.draw(|f| ui(f, &app))?;

    let timeout = tick_rate
      .checked_sub(last_tick.elapsed())
      .unwrap_or_else(|| Duration::from_secs(0));
    if event::poll(timeout)? {
      if let CEvent::Key(key) = event::read()? {
        match key.code {
          KeyCode::Char('q') => break,
          KeyCode::Right => app.next_tab(),
          KeyCode::Left => app.previous_tab(),
          _ => {}
        }
      }
    }
    if last_tick.elapsed() >= tick_rate {
      last_tick = Instant::now();
    }
  }

  disable_raw_mode()?;
  execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
  terminal.show_cursor()?;
  Ok(())
}

/// Fraction parsed from progress strings like "12/40 Images Loaded".
fn progress_ratio(progress: &str) -> Option<f64> {
  let counter = progress.split_whitespace().next()?;
  let (done, total) = counter.split_once('/')?;
  let done: f64 = done.parse().ok()?;
  let total: f64 = total.parse().ok()?;
  (total > 0.0).then(|| (done / total).clamp(0.0, 1.0))
}

fn status_color(status: TaskStatus) -> Color {
  match status {
    TaskStatus::Loading => Color::Yellow,
    TaskStatus::Success => Color::Green,
    TaskStatus::Fail => Color::Red,
  }
}

fn ui<B: Backend>(f: &mut tui::Frame<B>, app: &App) {
  let chunks = Layout::default()
    .direction(Direction::Vertical)
    .margin(1)
    .constraints([
      Constraint::Length(3),
      Constraint::Min(0),
      Constraint::Length(3),
    ].as_ref())
    .split(f.size());

  let tab_titles = vec!["Progress", "Task", "Log"];
  let tabs = Tabs::new(
    tab_titles
      .iter()
      .map(|t| Spans::from(Span::styled(*t, Style::default().fg(Color::Yellow))))
      .collect(),
  )
    .block(Block::default().borders(Borders::ALL).title(format!("Scraping \"{}\"", app.search)))
    .highlight_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
    .select(match app.current_tab {
      DashboardTab::Progress => 0,
      DashboardTab::Task => 1,
      DashboardTab::Log => 2,
    });
  f.render_widget(tabs, chunks[0]);

  match app.current_tab {
    DashboardTab::Progress => render_progress(f, app, chunks[1]),
    DashboardTab::Task => render_task(f, app, chunks[1]),
    DashboardTab::Log => render_log(f, app, chunks[1]),
  }

  let footer = Paragraph::new("←/→: Switch Tabs | q: Quit")
    .style(Style::default().fg(Color::White))
    .block(Block::default().borders(Borders::ALL));
  f.render_widget(footer, chunks[2]);
}

fn render_progress<B: Backend>(f: &mut tui::Frame<B>, app: &App, area: Rect) {
  let chunks = Layout::default()
    .direction(Direction::Vertical)
    .constraints([Constraint::Length(4), Constraint::Length(3), Constraint::Min(0)].as_ref())
    .split(area);

  let Some(task) = &app.task else {
    let waiting = Paragraph::new("Submitting request...")
      .block(Block::default().borders(Borders::ALL).title("Status"));
    f.render_widget(waiting, area);
    return;
  };

  let status = Paragraph::new(vec![
    Spans::from(vec![
      Span::styled(format!("{:?}", task.status), Style::default().fg(status_color(task.status)).add_modifier(Modifier::BOLD)),
      Span::raw(format!("  {}", task.msg)),
    ]),
    Spans::from(Span::raw(task.progress.clone())),
  ])
    .block(Block::default().borders(Borders::ALL).title("Status"));
  f.render_widget(status, chunks[0]);

  let ratio = match task.status {
    TaskStatus::Success => 1.0,
    _ => progress_ratio(&task.progress).unwrap_or(0.0),
  };
  let gauge = Gauge::default()
    .block(Block::default().borders(Borders::ALL).title("Phase Progress"))
    .gauge_style(Style::default().fg(status_color(task.status)))
    .ratio(ratio);
  f.render_widget(gauge, chunks[1]);
}

fn render_task<B: Backend>(f: &mut tui::Frame<B>, app: &App, area: Rect) {
  let items: Vec<ListItem> = match &app.task {
    Some(task) => vec![
      ("Task ID", task.task_id.to_string()),
      ("Status", format!("{:?}", task.status)),
      ("Message", task.msg.clone()),
      ("Progress", task.progress.clone()),
      ("Created", task.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()),
      ("Updated", task.updated_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()),
    ]
      .into_iter()
      .map(|(label, value)| {
        ListItem::new(Spans::from(vec![
          Span::styled(format!("{:<10}", label), Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)),
          Span::raw(value),
        ]))
      })
      .collect(),
    None => vec![ListItem::new(Spans::from(Span::raw("No task yet")))],
  };
  let list = List::new(items).block(Block::default().borders(Borders::ALL).title("Task"));
  f.render_widget(list, area);
}

fn render_log<B: Backend>(f: &mut tui::Frame<B>, app: &App, area: Rect) {
  let log_items: Vec<ListItem> = app.logs.iter().map(|l| {
    ListItem::new(Spans::from(vec![
      Span::styled(l.timestamp.format("%H:%M:%S").to_string(), Style::default().fg(Color::Green)),
      Span::raw(" - "),
      Span::raw(&l.message),
    ]))
  }).collect();
  let logs_list = List::new(log_items)
    .block(Block::default().borders(Borders::ALL).title("Task Log"));
  f.render_widget(logs_list, area);
}
