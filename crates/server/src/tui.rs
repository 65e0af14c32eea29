use std::collections::VecDeque;

use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Gauge, Paragraph, Row, Table, Tabs};

use skid::net::{NetworkStats, PeerId};
use skid::server::{PeerInfo, ServerStats};
use skid::snapshot::World;

const MAX_LOG_LINES: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    Overview,
    Peers,
    Entities,
    Log,
}

impl Tab {
    const ALL: [Tab; 4] = [Tab::Overview, Tab::Peers, Tab::Entities, Tab::Log];

    fn title(self) -> &'static str {
        match self {
            Tab::Overview => "Overview",
            Tab::Peers => "Peers",
            Tab::Entities => "Entities",
            Tab::Log => "Log",
        }
    }

    fn index(self) -> usize {
        Self::ALL.iter().position(|&t| t == self).unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone)]
struct LogLine {
    level: Level,
    message: String,
}

/// Everything the status screen needs for one frame.
pub struct Snapshot<'a> {
    pub stats: &'a ServerStats,
    pub network: &'a NetworkStats,
    pub peers: &'a [PeerInfo],
    pub world: &'a World,
    pub max_peers: usize,
    pub uptime_secs: u64,
}

pub struct TuiState {
    tab: Tab,
    log: VecDeque<LogLine>,
    /// Lines scrolled up from the bottom of the log.
    scroll: usize,
    selected_peer: usize,
    pending_kick: Option<PeerId>,
}

impl TuiState {
    pub fn new() -> Self {
        Self {
            tab: Tab::Overview,
            log: VecDeque::new(),
            scroll: 0,
            selected_peer: 0,
            pending_kick: None,
        }
    }

    pub fn active_tab(&self) -> Tab {
        self.tab
    }

    pub fn next_tab(&mut self) {
        self.tab = Tab::ALL[(self.tab.index() + 1) % Tab::ALL.len()];
    }

    pub fn prev_tab(&mut self) {
        self.tab = Tab::ALL[(self.tab.index() + Tab::ALL.len() - 1) % Tab::ALL.len()];
    }

    pub fn log_info(&mut self, message: impl Into<String>) {
        self.push_log(Level::Info, message.into());
    }

    pub fn log_warn(&mut self, message: impl Into<String>) {
        self.push_log(Level::Warn, message.into());
    }

    pub fn log_error(&mut self, message: impl Into<String>) {
        self.push_log(Level::Error, message.into());
    }

    fn push_log(&mut self, level: Level, message: String) {
        self.log.push_back(LogLine { level, message });
        if self.log.len() > MAX_LOG_LINES {
            self.log.pop_front();
        }
    }

    pub fn scroll_up(&mut self) {
        self.scroll = (self.scroll + 10).min(self.log.len().saturating_sub(1));
    }

    pub fn scroll_down(&mut self) {
        self.scroll = self.scroll.saturating_sub(10);
    }

    pub fn scroll_to_bottom(&mut self) {
        self.scroll = 0;
    }

    pub fn select_prev_peer(&mut self, count: usize) {
        if count > 0 {
            self.selected_peer = (self.selected_peer + count - 1) % count;
        }
    }

    pub fn select_next_peer(&mut self, count: usize) {
        if count > 0 {
            self.selected_peer = (self.selected_peer + 1) % count;
        }
    }

    pub fn request_kick(&mut self, peers: &[PeerInfo]) {
        if let Some(info) = peers.get(self.selected_peer) {
            self.pending_kick = Some(info.peer);
        }
    }

    pub fn take_pending_kick(&mut self) -> Option<PeerId> {
        self.pending_kick.take()
    }
}

pub fn render(frame: &mut Frame, state: &TuiState, view: &Snapshot<'_>) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(3),
        ])
        .split(frame.area());

    render_tabs(frame, chunks[0], state, view);
    match state.tab {
        Tab::Overview => render_overview(frame, chunks[1], view),
        Tab::Peers => render_peers(frame, chunks[1], state, view),
        Tab::Entities => render_entities(frame, chunks[1], view),
        Tab::Log => render_log(frame, chunks[1], state),
    }
    render_help(frame, chunks[2], state.tab);
}

fn render_tabs(frame: &mut Frame, area: Rect, state: &TuiState, view: &Snapshot<'_>) {
    let title = format!(
        " skid server - Uptime: {} - Tick {} ",
        format_duration(view.uptime_secs),
        view.stats.tick
    );
    let tabs = Tabs::new(Tab::ALL.iter().map(|t| t.title()))
        .select(state.tab.index())
        .block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan)),
        )
        .highlight_style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        );
    frame.render_widget(tabs, area);
}

fn render_overview(frame: &mut Frame, area: Rect, view: &Snapshot<'_>) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(6),
            Constraint::Min(0),
        ])
        .split(area);

    let max = view.max_peers.max(1);
    let gauge = Gauge::default()
        .block(
            Block::default()
                .title(" Peers ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Green)),
        )
        .gauge_style(Style::default().fg(Color::Green))
        .ratio((view.stats.peers as f64 / max as f64).min(1.0))
        .label(format!(
            "{}/{max} connected, {} joined",
            view.stats.peers, view.stats.joined
        ));
    frame.render_widget(gauge, chunks[0]);

    let sim = vec![
        stat_line(
            "Entities: ",
            format!("{} ({} bots)", view.stats.entities, view.stats.bots),
        ),
        stat_line("Snapshots sent: ", view.stats.snapshots_sent.to_string()),
        stat_line("Messages dropped: ", view.stats.messages_dropped.to_string()),
    ];
    frame.render_widget(
        Paragraph::new(sim).block(
            Block::default()
                .title(" Simulation ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Magenta)),
        ),
        chunks[1],
    );

    let net = view.network;
    let lines = vec![
        stat_line(
            "Packets: ",
            format!(
                "{} sent / {} recv / {} dropped / {} resent",
                net.packets_sent, net.packets_received, net.packets_dropped, net.packets_resent
            ),
        ),
        stat_line(
            "Bytes: ",
            format!(
                "{} sent / {} recv",
                format_bytes(net.bytes_sent),
                format_bytes(net.bytes_received)
            ),
        ),
        stat_line(
            "RTT: ",
            format!("{:.1}ms (+/- {:.1}ms)", net.rtt_ms, net.rtt_variance),
        ),
    ];
    frame.render_widget(
        Paragraph::new(lines).block(
            Block::default()
                .title(" Network ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Yellow)),
        ),
        chunks[2],
    );
}

fn render_peers(frame: &mut Frame, area: Rect, state: &TuiState, view: &Snapshot<'_>) {
    let rows = view.peers.iter().enumerate().map(|(i, info)| {
        let style = if i == state.selected_peer {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::White)
        };
        Row::new(vec![
            Cell::from(info.peer.to_string()),
            Cell::from(info.eid.map_or_else(|| "-".to_string(), |e| e.to_string())),
            Cell::from(
                info.rtt_ms
                    .map_or_else(|| "-".to_string(), |r| format!("{r:.1}ms")),
            ),
        ])
        .style(style)
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(8),
            Constraint::Length(8),
            Constraint::Min(10),
        ],
    )
    .header(Row::new(vec!["Peer", "Entity", "RTT"]).style(Style::default().fg(Color::Gray)))
    .block(
        Block::default()
            .title(" Peers ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Green)),
    );
    frame.render_widget(table, area);
}

fn render_entities(frame: &mut Frame, area: Rect, view: &Snapshot<'_>) {
    let mut entities: Vec<_> = view.world.entities().collect();
    entities.sort_by_key(|e| e.eid);

    let rows = entities.into_iter().map(|e| {
        Row::new(vec![
            Cell::from(e.eid.to_string()),
            Cell::from(e.tick.to_string()),
            Cell::from(format!("{:>7.2} {:>7.2}", e.pos.x, e.pos.y)),
            Cell::from(format!("{:>6.2}", e.ori)),
            Cell::from(format!("{:>5.2}", e.speed)),
            Cell::from(format!("{:>5.2} {:>5.2}", e.thr, e.steer)),
        ])
        .style(Style::default().fg(Color::Rgb(e.color.r, e.color.g, e.color.b)))
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(6),
            Constraint::Length(10),
            Constraint::Length(17),
            Constraint::Length(8),
            Constraint::Length(7),
            Constraint::Min(12),
        ],
    )
    .header(
        Row::new(vec!["Eid", "Tick", "Position", "Ori", "Speed", "Thr/Steer"])
            .style(Style::default().fg(Color::Gray)),
    )
    .block(
        Block::default()
            .title(" Entities ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Magenta)),
    );
    frame.render_widget(table, area);
}

fn render_log(frame: &mut Frame, area: Rect, state: &TuiState) {
    let visible = area.height.saturating_sub(2) as usize;
    let end = state.log.len().saturating_sub(state.scroll);
    let start = end.saturating_sub(visible);

    let lines: Vec<Line> = state
        .log
        .range(start..end)
        .map(|line| {
            let (tag, color) = match line.level {
                Level::Info => ("INFO ", Color::Green),
                Level::Warn => ("WARN ", Color::Yellow),
                Level::Error => ("ERROR", Color::Red),
            };
            Line::from(vec![
                Span::styled(tag, Style::default().fg(color)),
                Span::raw(" "),
                Span::styled(line.message.as_str(), Style::default().fg(Color::White)),
            ])
        })
        .collect();

    let title = if state.scroll > 0 {
        format!(" Log (+{}) ", state.scroll)
    } else {
        " Log ".to_string()
    };
    frame.render_widget(
        Paragraph::new(lines).block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Blue)),
        ),
        area,
    );
}

fn render_help(frame: &mut Frame, area: Rect, tab: Tab) {
    let text = match tab {
        Tab::Peers => "Up/Down select  k kick  Tab switch  q quit",
        Tab::Log => "PgUp/PgDn scroll  End follow  Tab switch  q quit",
        _ => "Tab switch  q/Esc quit",
    };
    let help = Paragraph::new(text)
        .block(
            Block::default()
                .title(" Controls ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::DarkGray)),
        )
        .style(
            Style::default()
                .fg(Color::DarkGray)
                .add_modifier(Modifier::ITALIC),
        );
    frame.render_widget(help, area);
}

fn stat_line(label: &'static str, value: String) -> Line<'static> {
    Line::from(vec![
        Span::styled(label, Style::default().fg(Color::Gray)),
        Span::styled(value, Style::default().fg(Color::White)),
    ])
}

fn format_duration(secs: u64) -> String {
    let hours = secs / 3600;
    let mins = (secs % 3600) / 60;
    let secs = secs % 60;
    format!("{hours:02}:{mins:02}:{secs:02}")
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes}B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1}KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1}MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
