use std::collections::{HashSet, VecDeque};
use std::io;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossterm::ExecutableCommand;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use miette::IntoDiagnostic;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};

use crate::app::{App, StatusEvent, StatusSink};
use crate::error::CatalogError;
use crate::registry::{DocumentRegistry, RegistryNotice};
use crate::tree::{FlatNode, NodeId, PathSegment, TreeEvent, TreePath};

const EVENTS_MAX: usize = 6;
const LOGS_MAX: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum View {
    Tree,
    Logs,
    Help,
}

#[derive(Debug)]
struct BrowserState {
    view: View,
    status: String,
    selected: usize,
    collapsed: HashSet<NodeId>,
    events: VecDeque<String>,
    logs: VecDeque<String>,
    log_scroll: u16,
    started: Instant,
}

/// Terminal browser over the document tree.
pub struct Tui {
    state: Arc<Mutex<BrowserState>>,
}

/// Status sink that feeds the browser's event and log panes.
pub struct TuiStatus {
    state: Arc<Mutex<BrowserState>>,
}

impl StatusSink for TuiStatus {
    fn event(&self, event: StatusEvent) {
        if let Ok(mut state) = self.state.lock() {
            let message = event.message.trim().to_string();
            state.status = message.clone();
            push_event(&mut state.events, message.clone());
            push_log(&mut state.logs, format!("[{}] {message}", timestamp()));
        }
    }
}

#[derive(Debug)]
enum Action {
    Quit,
    Continue,
    Delete,
    Duplicate,
    RestoreAxes,
    MakeCurrent,
}

impl Default for Tui {
    fn default() -> Self {
        Self::new()
    }
}

impl Tui {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(BrowserState {
                view: View::Tree,
                status: "ready".to_string(),
                selected: 0,
                collapsed: HashSet::new(),
                events: VecDeque::new(),
                logs: VecDeque::new(),
                log_scroll: 0,
                started: Instant::now(),
            })),
        }
    }

    pub fn status_sink(&self) -> TuiStatus {
        TuiStatus {
            state: self.state.clone(),
        }
    }

    /// Run the browser until the user quits. Edits made here go through the
    /// registry like any other caller.
    pub fn browse(&mut self, app: &mut App) -> miette::Result<()> {
        let mut stdout = io::stdout();
        enable_raw_mode().into_diagnostic()?;
        stdout.execute(EnterAlternateScreen).into_diagnostic()?;

        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).into_diagnostic()?;
        terminal.clear().into_diagnostic()?;

        let result = self.event_loop(&mut terminal, app);

        disable_raw_mode().into_diagnostic()?;
        let mut stdout = io::stdout();
        stdout.execute(LeaveAlternateScreen).into_diagnostic()?;
        result
    }

    fn event_loop(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
        app: &mut App,
    ) -> miette::Result<()> {
        loop {
            self.absorb_changes(app.registry_mut());
            let rows = self.visible_rows(app.registry());
            if let Ok(mut state) = self.state.lock() {
                state.selected = state.selected.min(rows.len().saturating_sub(1));
                let registry = app.registry();
                terminal
                    .draw(|frame| draw_ui(frame, &state, registry, &rows))
                    .into_diagnostic()?;
            }

            if !event::poll(Duration::from_millis(120)).into_diagnostic()? {
                continue;
            }
            let Event::Key(key) = event::read().into_diagnostic()? else {
                continue;
            };
            let selected = self
                .state
                .lock()
                .ok()
                .and_then(|state| rows.get(state.selected).cloned());
            match self.handle_key(key, &rows) {
                Action::Quit => return Ok(()),
                Action::Continue => {}
                action => {
                    if let Some(node) = selected {
                        self.perform(action, &node, app);
                    }
                }
            }
        }
    }

    fn handle_key(&mut self, key: KeyEvent, rows: &[FlatNode]) -> Action {
        if key.kind != KeyEventKind::Press {
            return Action::Continue;
        }
        let Ok(mut state) = self.state.lock() else {
            return Action::Quit;
        };
        if state.view == View::Help && !matches!(key.code, KeyCode::Char('q')) {
            state.view = View::Tree;
            return Action::Continue;
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => return Action::Quit,
            KeyCode::Char('?') | KeyCode::F(1) => state.view = View::Help,
            KeyCode::Tab => {
                state.view = if state.view == View::Logs {
                    View::Tree
                } else {
                    View::Logs
                };
            }
            KeyCode::Up | KeyCode::Char('k') => {
                if state.view == View::Logs {
                    state.log_scroll = state.log_scroll.saturating_sub(1);
                } else {
                    state.selected = state.selected.saturating_sub(1);
                }
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if state.view == View::Logs {
                    state.log_scroll = state.log_scroll.saturating_add(1);
                } else if state.selected + 1 < rows.len() {
                    state.selected += 1;
                }
            }
            KeyCode::Enter | KeyCode::Char(' ') => {
                if let Some(node) = rows.get(state.selected) {
                    if node.has_children && !state.collapsed.remove(&node.id) {
                        state.collapsed.insert(node.id);
                    }
                }
            }
            KeyCode::Char('d') | KeyCode::Delete => return Action::Delete,
            KeyCode::Char('c') => return Action::Duplicate,
            KeyCode::Char('r') => return Action::RestoreAxes,
            KeyCode::Char('s') => return Action::MakeCurrent,
            _ => {}
        }
        Action::Continue
    }

    fn perform(&self, action: Action, node: &FlatNode, app: &mut App) {
        let registry = app.registry_mut();
        let Some(path) = registry.projection().path_of(node.id) else {
            return;
        };
        let outcome = match action {
            Action::Delete => delete_at(registry, &path),
            Action::Duplicate => duplicate_at(registry, &path),
            Action::RestoreAxes => match path.dataset_ref() {
                Some(dataset) => registry.restore_axes(&dataset).map(|restored| {
                    if restored {
                        format!("restored axes of {dataset}")
                    } else {
                        format!("{dataset} has original axes")
                    }
                }),
                None => Ok("select a dataset to restore its axes".to_string()),
            },
            Action::MakeCurrent => match path.segments().first() {
                Some(PathSegment::Document(title)) => registry
                    .set_current(title)
                    .map(|()| format!("current document: {title}")),
                _ => return,
            },
            Action::Quit | Action::Continue => return,
        };
        let message = outcome.unwrap_or_else(|err| format!("error: {err}"));
        self.status_sink().event(StatusEvent {
            message,
            elapsed: None,
        });
    }

    /// Fold projection events and registry notices into the event pane.
    fn absorb_changes(&self, registry: &mut DocumentRegistry) {
        let events = registry.drain_tree_events();
        let notices = registry.drain_notices();
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        for event in events {
            let line = match event {
                TreeEvent::Inserted { node, .. } => format!("node {} added", node.get()),
                TreeEvent::Updated { node } => format!("node {} updated", node.get()),
                TreeEvent::Relabeled { label, .. } => format!("relabelled to {label}"),
                TreeEvent::Removed { node } => {
                    state.collapsed.remove(&node);
                    format!("node {} removed", node.get())
                }
                TreeEvent::Reset => {
                    state.collapsed.clear();
                    "tree rebuilt".to_string()
                }
            };
            push_log(&mut state.logs, format!("[{}] {line}", timestamp()));
        }
        for notice in notices {
            let line = match notice {
                RegistryNotice::Renamed { from, to } => format!("document {from} renamed to {to}"),
                RegistryNotice::Deleted { title } => format!("document {title} deleted"),
                RegistryNotice::DatasetRenamed { from, to } => format!("{from} renamed to {to}"),
                RegistryNotice::DatasetRemoved { dataset } => format!("{dataset} removed"),
            };
            push_event(&mut state.events, line.clone());
            push_log(&mut state.logs, format!("[{}] {line}", timestamp()));
        }
    }

    fn visible_rows(&self, registry: &DocumentRegistry) -> Vec<FlatNode> {
        let collapsed = match self.state.lock() {
            Ok(state) => state.collapsed.clone(),
            Err(_) => HashSet::new(),
        };
        let mut rows = Vec::new();
        let mut hidden_below: Option<usize> = None;
        for node in registry.projection().flatten() {
            if let Some(depth) = hidden_below {
                if node.depth > depth {
                    continue;
                }
                hidden_below = None;
            }
            if collapsed.contains(&node.id) {
                hidden_below = Some(node.depth);
            }
            rows.push(node);
        }
        rows
    }
}

fn delete_at(registry: &mut DocumentRegistry, path: &TreePath) -> Result<String, CatalogError> {
    match path.segments() {
        [PathSegment::Document(title)] => Ok(match registry.delete(title) {
            Some(_) => format!("deleted document {title}"),
            None => format!("{title} is already gone"),
        }),
        [.., PathSegment::Annotations, PathSegment::Annotation(key)] => {
            let Some(dataset) = path.dataset_ref() else {
                return Ok(String::new());
            };
            registry
                .detach_annotation(&dataset, key)
                .map(|_| format!("removed annotation {key}"))
        }
        [.., PathSegment::UniDec, PathSegment::Result(name)] => {
            let Some(dataset) = path.dataset_ref() else {
                return Ok(String::new());
            };
            registry
                .remove_unidec_result(&dataset, name)
                .map(|_| format!("removed result {name}"))
        }
        _ => match path.dataset_ref() {
            Some(dataset) if TreePath::dataset(&dataset) == *path => registry
                .remove_dataset(&dataset)
                .map(|_| format!("removed {dataset}")),
            _ => Ok("nothing to delete here".to_string()),
        },
    }
}

fn duplicate_at(registry: &mut DocumentRegistry, path: &TreePath) -> Result<String, CatalogError> {
    match path.segments() {
        [PathSegment::Document(title)] => registry
            .duplicate(title)
            .map(|copy| format!("duplicated {title} as {copy}")),
        _ => match path.dataset_ref() {
            Some(dataset) if dataset.key.is_some() => registry
                .duplicate_dataset(&dataset)
                .map(|copy| format!("duplicated as {copy}")),
            _ => Ok("only documents and keyed datasets can be duplicated".to_string()),
        },
    }
}

fn draw_ui(
    frame: &mut ratatui::Frame,
    state: &BrowserState,
    registry: &DocumentRegistry,
    rows: &[FlatNode],
) {
    match state.view {
        View::Tree => draw_tree_view(frame, state, registry, rows),
        View::Logs => draw_logs(frame, state, registry),
        View::Help => draw_help(frame),
    }
}

fn draw_tree_view(
    frame: &mut ratatui::Frame,
    state: &BrowserState,
    registry: &DocumentRegistry,
    rows: &[FlatNode],
) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(EVENTS_MAX as u16 + 2),
        ])
        .split(frame.area());

    frame.render_widget(draw_header(state, registry), chunks[0]);

    let main = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(chunks[1]);

    let height = main[0].height.saturating_sub(2) as usize;
    let offset = state.selected.saturating_sub(height.saturating_sub(1));
    frame.render_widget(draw_tree_panel(state, rows).scroll((offset as u16, 0)), main[0]);
    frame.render_widget(draw_details_panel(state, registry, rows), main[1]);
    frame.render_widget(draw_events_panel(state), chunks[2]);
}

fn draw_logs(frame: &mut ratatui::Frame, state: &BrowserState, registry: &DocumentRegistry) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(8)])
        .split(frame.area());

    frame.render_widget(draw_header(state, registry), chunks[0]);
    let lines: Vec<Line> = state.logs.iter().map(|line| Line::from(line.clone())).collect();
    let logs = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Logs"))
        .scroll((state.log_scroll, 0))
        .wrap(Wrap { trim: false });
    frame.render_widget(logs, chunks[1]);
}

fn draw_help(frame: &mut ratatui::Frame) {
    let block = Block::default().borders(Borders::ALL).title("Help");
    let lines = vec![
        Line::from("Up/Down or j/k move   Enter/Space expand or collapse"),
        Line::from("d delete   c duplicate   r restore axes   s make document current"),
        Line::from("Tab logs   ? help   q quit"),
    ];
    let view = Paragraph::new(lines).block(block).wrap(Wrap { trim: true });
    frame.render_widget(view, frame.area());
}

fn draw_header(state: &BrowserState, registry: &DocumentRegistry) -> Paragraph<'static> {
    let uptime = state.started.elapsed().as_secs();
    let header_line = Line::from(vec![
        Span::styled(
            "IMS-DOCS",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" "),
        Span::styled(env!("CARGO_PKG_VERSION"), Style::default().fg(Color::Gray)),
        Span::raw(format!(
            "   Documents: {}   Current: ",
            registry.len()
        )),
        Span::styled(
            registry.current().unwrap_or("-").to_string(),
            Style::default().fg(Color::Green),
        ),
    ]);
    let status_line = Line::from(Span::styled(
        format!("{}   ({uptime}s)", state.status),
        Style::default().fg(Color::Gray),
    ));
    Paragraph::new(vec![header_line, status_line])
        .alignment(Alignment::Left)
        .block(Block::default().borders(Borders::BOTTOM))
}

fn draw_tree_panel(state: &BrowserState, rows: &[FlatNode]) -> Paragraph<'static> {
    let lines: Vec<Line> = rows
        .iter()
        .enumerate()
        .map(|(index, node)| {
            let marker = if !node.has_children {
                " "
            } else if state.collapsed.contains(&node.id) {
                "+"
            } else {
                "-"
            };
            let text = format!("{}{marker} {}", "  ".repeat(node.depth), node.label);
            let mut style = if node.has_payload {
                Style::default().fg(Color::White)
            } else {
                Style::default().fg(Color::Cyan)
            };
            if index == state.selected {
                style = style.add_modifier(Modifier::REVERSED);
            }
            Line::from(Span::styled(text, style))
        })
        .collect();
    Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Documents"))
}

fn draw_details_panel(
    state: &BrowserState,
    registry: &DocumentRegistry,
    rows: &[FlatNode],
) -> Paragraph<'static> {
    let block = Block::default().borders(Borders::ALL).title("Details");
    let Some(path) = rows
        .get(state.selected)
        .and_then(|node| registry.projection().path_of(node.id))
    else {
        return Paragraph::new("No documents open. Import files with `ims-docs import`.")
            .block(block)
            .wrap(Wrap { trim: true });
    };

    let mut lines = vec![Line::from(Span::styled(
        path.to_string(),
        Style::default().add_modifier(Modifier::BOLD),
    ))];
    if let [PathSegment::Document(title)] = path.segments() {
        if let Some(doc) = registry.get(title) {
            lines.push(Line::from(doc.document_type.to_string()));
            lines.push(Line::from(format!("Datasets: {}", doc.catalog.len())));
            lines.push(Line::from(format!(
                "Created: {}",
                doc.created_at.format("%Y-%m-%d %H:%M")
            )));
            if let Some(source) = &doc.path {
                lines.push(Line::from(format!("Path: {source}")));
            }
        }
    } else if let Some(dataset) = path.dataset_ref() {
        if let Ok(Some(payload)) = registry.dataset(&dataset) {
            lines.push(Line::from(format!("Kind: {}", payload.kind())));
            lines.push(Line::from(format!("Points: {}", payload.len())));
            if let Some(z) = &payload.z_values {
                lines.push(Line::from(format!(
                    "Matrix: {} x {}",
                    z.len(),
                    z.first().map(Vec::len).unwrap_or(0)
                )));
            }
            lines.push(Line::from(format!(
                "Axes: {} / {}",
                payload.x_label, payload.y_label
            )));
            if let Some(original) = payload.default_axes() {
                lines.push(Line::from(format!(
                    "Original axes: {} / {} (r restores)",
                    original.x_label, original.y_label
                )));
            }
            lines.push(Line::from(format!(
                "Annotations: {}",
                payload.annotations().map(|set| set.len()).unwrap_or(0)
            )));
            lines.push(Line::from(format!(
                "UniDec results: {}",
                payload.unidec_results().map(|map| map.len()).unwrap_or(0)
            )));
            for (key, value) in payload.metadata.iter().take(8) {
                lines.push(Line::from(format!("{key}: {value}")));
            }
        }
    }
    Paragraph::new(lines).block(block).wrap(Wrap { trim: true })
}

fn draw_events_panel(state: &BrowserState) -> Paragraph<'static> {
    let lines: Vec<Line> = state
        .events
        .iter()
        .map(|line| Line::from(Span::styled(line.clone(), Style::default().fg(Color::Gray))))
        .collect();
    Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Events (? help, q quit)"),
    )
}

fn push_event(buffer: &mut VecDeque<String>, item: String) {
    buffer.push_back(item);
    while buffer.len() > EVENTS_MAX {
        buffer.pop_front();
    }
}

fn push_log(buffer: &mut VecDeque<String>, item: String) {
    buffer.push_back(item);
    while buffer.len() > LOGS_MAX {
        buffer.pop_front();
    }
}

fn timestamp() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}
