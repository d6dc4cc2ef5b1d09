use crate::comparison::ComparisonSet;
use crate::error::MarketError;
use crate::market::{self, Asset, SortKey, TrendPoint};
use crate::store::Store;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{
        Axis, Block, Borders, Chart, Clear, Dataset, GraphType, List, ListItem, ListState,
        Paragraph, Tabs, Wrap,
    },
    Frame, Terminal,
};
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tui_big_text::{BigText, PixelSize};

pub const REFRESH_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tab {
    Market,
    Compare,
}

impl Tab {
    fn title(self) -> &'static str {
        match self {
            Tab::Market => "Market",
            Tab::Compare => "Compare",
        }
    }

    fn all() -> &'static [Tab] {
        &[Tab::Market, Tab::Compare]
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NetworkStatus {
    Connected,
    Disconnected,
}

/// Messages from background fetch tasks into the event loop.
///
/// Every message carries the generation of the request that produced it, so
/// a late response from a superseded request can be discarded instead of
/// overwriting fresher state.
#[derive(Debug)]
pub enum Update {
    Snapshot {
        generation: u64,
        result: Result<Vec<Asset>, MarketError>,
    },
    Trend {
        generation: u64,
        id: String,
        result: Result<Vec<TrendPoint>, MarketError>,
    },
}

/// Colors for the two display themes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Theme {
    pub background: Color,
    pub text: Color,
    pub accent: Color,
    pub dim: Color,
    pub up: Color,
    pub down: Color,
}

impl Theme {
    pub fn from_flag(dark_mode: bool) -> Theme {
        if dark_mode {
            Theme {
                background: Color::Black,
                text: Color::White,
                accent: Color::Yellow,
                dim: Color::DarkGray,
                up: Color::LightGreen,
                down: Color::LightRed,
            }
        } else {
            Theme {
                background: Color::White,
                text: Color::Black,
                accent: Color::Blue,
                dim: Color::Gray,
                up: Color::Green,
                down: Color::Red,
            }
        }
    }
}

pub struct App {
    pub current_tab: Tab,
    pub snapshot: Vec<Asset>,
    pub sort_key: Option<SortKey>,
    pub comparison: ComparisonSet,
    pub dark_mode: bool,
    pub theme: Theme,
    pub store: Store,
    pub should_quit: bool,
    pub notice: Option<String>,
    pub network_status: NetworkStatus,
    pub list_state: ListState,
    pub card_index: usize,
    pub charted_id: Option<String>,
    pub trend: Vec<TrendPoint>,
    pub last_refresh: Option<Instant>,
    snapshot_generation: u64,
    chart_generation: u64,
    pub refresh_counter: Arc<AtomicU64>,
    pub update_tx: mpsc::UnboundedSender<Update>,
    update_rx: mpsc::UnboundedReceiver<Update>,
}

impl App {
    /// Restores persisted state (theme, selection, cached snapshot) so the
    /// dashboard is populated before the first network response lands.
    pub fn new(store: Store) -> App {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let dark_mode = store.load_dark_mode();
        let comparison = ComparisonSet::from_ids(store.load_selection());
        let snapshot = store.load_snapshot().unwrap_or_default();

        let mut list_state = ListState::default();
        if !snapshot.is_empty() {
            list_state.select(Some(0));
        }

        App {
            current_tab: Tab::Market,
            snapshot,
            sort_key: Some(SortKey::MarketCap),
            comparison,
            dark_mode,
            theme: Theme::from_flag(dark_mode),
            store,
            should_quit: false,
            notice: None,
            network_status: NetworkStatus::Connected,
            list_state,
            card_index: 0,
            charted_id: None,
            trend: Vec::new(),
            last_refresh: None,
            snapshot_generation: 0,
            chart_generation: 0,
            refresh_counter: Arc::new(AtomicU64::new(0)),
            update_tx,
            update_rx,
        }
    }

    pub fn try_receive_updates(&mut self) -> bool {
        let mut updated = false;
        while let Ok(update) = self.update_rx.try_recv() {
            match update {
                Update::Snapshot { generation, result } => {
                    updated |= self.apply_snapshot(generation, result);
                }
                Update::Trend {
                    generation,
                    id,
                    result,
                } => {
                    updated |= self.apply_trend(generation, &id, result);
                }
            }
        }
        updated
    }

    /// Applies a snapshot response unless a newer one already landed.
    /// On success the snapshot is replaced wholesale and written to the
    /// store; on failure the previous snapshot stays on screen.
    pub fn apply_snapshot(
        &mut self,
        generation: u64,
        result: Result<Vec<Asset>, MarketError>,
    ) -> bool {
        if generation <= self.snapshot_generation {
            return false;
        }
        self.snapshot_generation = generation;
        self.last_refresh = Some(Instant::now());
        match result {
            Ok(snapshot) => {
                self.snapshot = snapshot;
                self.network_status = NetworkStatus::Connected;
                self.store.save_snapshot(&self.snapshot).ok();
                match self.list_state.selected() {
                    _ if self.snapshot.is_empty() => self.list_state.select(None),
                    None => self.list_state.select(Some(0)),
                    Some(i) if i >= self.snapshot.len() => {
                        self.list_state.select(Some(self.snapshot.len() - 1));
                    }
                    _ => {}
                }
            }
            Err(_) => {
                self.network_status = NetworkStatus::Disconnected;
            }
        }
        true
    }

    /// Applies a trend response only if it answers the current chart
    /// request. A failed fetch leaves the previous chart untouched.
    pub fn apply_trend(
        &mut self,
        generation: u64,
        id: &str,
        result: Result<Vec<TrendPoint>, MarketError>,
    ) -> bool {
        if generation != self.chart_generation {
            return false;
        }
        match result {
            Ok(points) => {
                self.charted_id = Some(id.to_string());
                self.trend = points;
                true
            }
            Err(_) => {
                self.network_status = NetworkStatus::Disconnected;
                false
            }
        }
    }

    /// Registers a new chart request, superseding any in-flight one.
    pub fn begin_chart_request(&mut self) -> u64 {
        self.chart_generation += 1;
        self.chart_generation
    }

    pub fn sorted_view(&self) -> Vec<Asset> {
        market::sorted(&self.snapshot, self.sort_key)
    }

    pub fn selected_asset_id(&self) -> Option<String> {
        let view = self.sorted_view();
        self.list_state
            .selected()
            .and_then(|i| view.get(i))
            .map(|asset| asset.id.clone())
    }

    pub fn selected_card_id(&self) -> Option<String> {
        self.comparison
            .resolve(&self.snapshot)
            .get(self.card_index)
            .map(|asset| asset.id.clone())
    }

    pub fn charted_asset(&self) -> Option<&Asset> {
        let id = self.charted_id.as_deref()?;
        self.snapshot.iter().find(|asset| asset.id == id)
    }

    pub fn add_to_comparison(&mut self, id: &str) {
        match self.comparison.add(id) {
            Ok(()) => {
                self.store.save_selection(self.comparison.ids()).ok();
            }
            Err(e) => self.notice = Some(e.to_string()),
        }
    }

    pub fn remove_from_comparison(&mut self, id: &str) {
        self.comparison.remove(id);
        self.store.save_selection(self.comparison.ids()).ok();
        if self.card_index > 0 && self.card_index >= self.comparison.len() {
            self.card_index -= 1;
        }
    }

    pub fn clear_comparison(&mut self) {
        self.comparison.clear();
        self.store.clear_selection().ok();
        self.card_index = 0;
    }

    pub fn set_theme(&mut self, enabled: bool) {
        self.dark_mode = enabled;
        self.theme = Theme::from_flag(enabled);
        self.store.save_dark_mode(enabled).ok();
    }

    pub fn toggle_theme(&mut self) {
        self.set_theme(!self.dark_mode);
    }

    pub fn cycle_sort(&mut self) {
        self.sort_key = match self.sort_key {
            Some(SortKey::MarketCap) => Some(SortKey::Name),
            Some(SortKey::Name) => Some(SortKey::Price),
            Some(SortKey::Price) => Some(SortKey::Change),
            Some(SortKey::Change) => None,
            None => Some(SortKey::MarketCap),
        };
    }

    pub fn next_tab(&mut self) {
        let tabs = Tab::all();
        let current = tabs
            .iter()
            .position(|&t| t == self.current_tab)
            .unwrap_or(0);
        self.current_tab = tabs[(current + 1) % tabs.len()];
    }

    pub fn previous_tab(&mut self) {
        let tabs = Tab::all();
        let current = tabs
            .iter()
            .position(|&t| t == self.current_tab)
            .unwrap_or(0);
        self.current_tab = tabs[(current + tabs.len() - 1) % tabs.len()];
    }

    pub fn select_next(&mut self) {
        match self.current_tab {
            Tab::Market => {
                let len = self.snapshot.len();
                if len == 0 {
                    return;
                }
                let i = match self.list_state.selected() {
                    Some(i) => (i + 1).min(len - 1),
                    None => 0,
                };
                self.list_state.select(Some(i));
            }
            Tab::Compare => {
                let len = self.comparison.resolve(&self.snapshot).len();
                if len == 0 {
                    return;
                }
                self.card_index = (self.card_index + 1).min(len - 1);
            }
        }
    }

    pub fn select_previous(&mut self) {
        match self.current_tab {
            Tab::Market => {
                let i = match self.list_state.selected() {
                    Some(i) => i.saturating_sub(1),
                    None => 0,
                };
                self.list_state.select(Some(i));
            }
            Tab::Compare => {
                self.card_index = self.card_index.saturating_sub(1);
            }
        }
    }
}

/// Issues one snapshot fetch with the next generation number. The periodic
/// timer and the manual refresh key both come through here, so overlapping
/// fetches stay ordered.
fn spawn_snapshot_fetch(tx: mpsc::UnboundedSender<Update>, counter: Arc<AtomicU64>) {
    let generation = counter.fetch_add(1, Ordering::SeqCst) + 1;
    tokio::spawn(async move {
        let result = market::fetch_markets().await;
        let _ = tx.send(Update::Snapshot { generation, result });
    });
}

fn spawn_trend_fetch(tx: mpsc::UnboundedSender<Update>, id: String, generation: u64) {
    tokio::spawn(async move {
        let result = market::fetch_market_chart(&id).await;
        let _ = tx.send(Update::Trend {
            generation,
            id,
            result,
        });
    });
}

pub async fn run_tui(store: Store) -> eyre::Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(store);

    // Periodic snapshot refresh. The tick is unconditional: a slow fetch
    // does not delay the next one, and stale responses are filtered by
    // generation when they land.
    let tx = app.update_tx.clone();
    let counter = app.refresh_counter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(REFRESH_INTERVAL_SECS));
        loop {
            interval.tick().await;
            if tx.is_closed() {
                break;
            }
            spawn_snapshot_fetch(tx.clone(), counter.clone());
        }
    });

    let res = run_app(&mut terminal, &mut app).await;

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    res
}

async fn run_app<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> eyre::Result<()>
where
    B::Error: Send + Sync + 'static,
{
    loop {
        terminal.draw(|f| ui(f, app))?;

        app.try_receive_updates();

        if crossterm::event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    handle_key(app, key.code);
                }
            }
        }

        if app.should_quit {
            break;
        }
    }
    Ok(())
}

fn handle_key(app: &mut App, code: KeyCode) {
    // any key dismisses a visible notice
    if app.notice.take().is_some() {
        return;
    }

    match code {
        KeyCode::Char('q') | KeyCode::Esc => app.should_quit = true,
        KeyCode::Char('h') | KeyCode::Left | KeyCode::BackTab => app.previous_tab(),
        KeyCode::Char('l') | KeyCode::Right | KeyCode::Tab => app.next_tab(),
        KeyCode::Char('1') => app.current_tab = Tab::Market,
        KeyCode::Char('2') => app.current_tab = Tab::Compare,
        KeyCode::Char('j') | KeyCode::Down => app.select_next(),
        KeyCode::Char('k') | KeyCode::Up => app.select_previous(),
        KeyCode::Char('s') => app.cycle_sort(),
        KeyCode::Char('t') => app.toggle_theme(),
        KeyCode::Char('c') => app.clear_comparison(),
        KeyCode::Char('r') => {
            spawn_snapshot_fetch(app.update_tx.clone(), app.refresh_counter.clone());
        }
        KeyCode::Char('x') | KeyCode::Char('d') => {
            if app.current_tab == Tab::Compare {
                if let Some(id) = app.selected_card_id() {
                    app.remove_from_comparison(&id);
                }
            }
        }
        KeyCode::Enter | KeyCode::Char('a') => match app.current_tab {
            Tab::Market => {
                if let Some(id) = app.selected_asset_id() {
                    app.add_to_comparison(&id);
                }
            }
            Tab::Compare => {
                if let Some(id) = app.selected_card_id() {
                    let generation = app.begin_chart_request();
                    spawn_trend_fetch(app.update_tx.clone(), id, generation);
                }
            }
        },
        _ => {}
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let theme = app.theme;

    f.render_widget(
        Block::default().style(Style::default().bg(theme.background).fg(theme.text)),
        f.area(),
    );

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)])
        .split(f.area());

    let tab_titles: Vec<Line> = Tab::all()
        .iter()
        .map(|t| {
            let style = if *t == app.current_tab {
                Style::default()
                    .fg(theme.accent)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(theme.text)
            };
            Line::from(Span::styled(t.title(), style))
        })
        .collect();

    let network_indicator = match app.network_status {
        NetworkStatus::Connected => "🟢",
        NetworkStatus::Disconnected => "🔴",
    };
    let refreshed = match app.last_refresh {
        Some(at) => format!("updated {}s ago", at.elapsed().as_secs()),
        None => "loading…".to_string(),
    };

    let tabs = Tabs::new(tab_titles)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("cryptodash {network_indicator} {refreshed}")),
        )
        .style(Style::default().fg(theme.text))
        .highlight_style(Style::default().fg(theme.accent))
        .select(
            Tab::all()
                .iter()
                .position(|&t| t == app.current_tab)
                .unwrap_or(0),
        );

    f.render_widget(tabs, chunks[0]);

    match app.current_tab {
        Tab::Market => render_market(f, chunks[1], app),
        Tab::Compare => render_compare(f, chunks[1], app),
    }

    if let Some(notice) = app.notice.clone() {
        render_notice(f, &notice, &theme);
    }
}

fn render_market(f: &mut Frame, area: Rect, app: &mut App) {
    let theme = app.theme;
    let view = app.sorted_view();

    if view.is_empty() {
        render_loading(f, area, &theme);
        return;
    }

    let items: Vec<ListItem> = view
        .iter()
        .map(|asset| {
            // mark assets that are already in the comparison set
            let marker = if app.comparison.contains(&asset.id) {
                "● "
            } else {
                "  "
            };
            ListItem::new(format!("{marker}{}", market::list_entry(asset)))
        })
        .collect();

    let sort_label = app
        .sort_key
        .map(|key| key.label())
        .unwrap_or("fetch order");
    let title = format!(
        "Market ({} by {sort_label}) - Enter: compare | s: sort | t: theme | r: refresh | q: quit",
        view.len()
    );

    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .style(Style::default().fg(theme.text))
        .highlight_style(
            Style::default()
                .fg(theme.accent)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    f.render_stateful_widget(list, area, &mut app.list_state);
}

fn render_compare(f: &mut Frame, area: Rect, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(8), Constraint::Min(0)])
        .split(area);

    render_cards(f, chunks[0], app);
    render_trend(f, chunks[1], app);
}

fn render_cards(f: &mut Frame, area: Rect, app: &App) {
    let theme = app.theme;
    let cards = app.comparison.resolve(&app.snapshot);

    if cards.is_empty() {
        let empty = Paragraph::new(
            "No cryptocurrencies selected.\nPress Enter on the market list to add up to 5.",
        )
        .block(Block::default().borders(Borders::ALL).title("Comparison"))
        .style(Style::default().fg(theme.dim))
        .alignment(Alignment::Center);
        f.render_widget(empty, area);
        return;
    }

    let constraints: Vec<Constraint> = cards
        .iter()
        .map(|_| Constraint::Ratio(1, cards.len() as u32))
        .collect();
    let card_areas = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(constraints)
        .split(area);

    for (i, asset) in cards.iter().enumerate() {
        let border_style = if i == app.card_index {
            Style::default().fg(theme.accent)
        } else {
            Style::default().fg(theme.dim)
        };
        let change = asset.price_change_percentage_24h;
        let change_color = if change.unwrap_or(0.0) >= 0.0 {
            theme.up
        } else {
            theme.down
        };

        let lines = vec![
            Line::from(Span::styled(
                asset.name.clone(),
                Style::default()
                    .fg(theme.text)
                    .add_modifier(Modifier::BOLD),
            )),
            Line::from(format!("Price: {}", market::format_usd(asset.current_price))),
            Line::from(Span::styled(
                format!("24h Change: {}", market::format_change(change)),
                Style::default().fg(change_color),
            )),
            Line::from(format!(
                "Market Cap: {}",
                market::format_market_cap(asset.market_cap)
            )),
        ];

        let card = Paragraph::new(lines)
            .wrap(Wrap { trim: true })
            .style(Style::default().fg(theme.text))
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(border_style)
                    .title(asset.symbol.to_uppercase()),
            );
        f.render_widget(card, card_areas[i]);
    }
}

fn render_trend(f: &mut Frame, area: Rect, app: &App) {
    let theme = app.theme;

    if app.trend.is_empty() {
        let placeholder = Paragraph::new("Select a card and press Enter to load the 7-day trend")
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title("7-Day Price Trend"),
            )
            .style(Style::default().fg(theme.dim))
            .alignment(Alignment::Center);
        f.render_widget(placeholder, area);
        return;
    }

    // big current price when the charted asset is still in the snapshot
    let mut chart_area = area;
    if let Some(asset) = app.charted_asset() {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(5), Constraint::Min(0)])
            .split(area);

        let big_price = BigText::builder()
            .pixel_size(PixelSize::Quadrant)
            .style(
                Style::default()
                    .fg(theme.accent)
                    .add_modifier(Modifier::BOLD),
            )
            .lines(vec![market::format_usd(asset.current_price).into()])
            .build();
        f.render_widget(big_price, chunks[0]);
        chart_area = chunks[1];
    }

    let data: Vec<(f64, f64)> = app
        .trend
        .iter()
        .enumerate()
        .map(|(i, point)| (i as f64, point.price))
        .collect();

    let min_price = app.trend.iter().map(|p| p.price).fold(f64::INFINITY, f64::min);
    let max_price = app
        .trend
        .iter()
        .map(|p| p.price)
        .fold(f64::NEG_INFINITY, f64::max);
    let min_y = min_price * 0.98;
    let max_y = max_price * 1.02;
    let max_x = (data.len().saturating_sub(1)).max(1) as f64;

    let first_label = market::day_month_label(app.trend[0].timestamp_ms);
    let middle_label = market::day_month_label(app.trend[app.trend.len() / 2].timestamp_ms);
    let last_label = market::day_month_label(app.trend[app.trend.len() - 1].timestamp_ms);

    let datasets = vec![Dataset::default()
        .name("7-Day Price Trend")
        .marker(symbols::Marker::Braille)
        .graph_type(GraphType::Line)
        .style(Style::default().fg(theme.accent))
        .data(&data)];

    let title = match &app.charted_id {
        Some(id) => format!("{id} - 7-Day Price Trend (USD)"),
        None => "7-Day Price Trend (USD)".to_string(),
    };

    let chart = Chart::new(datasets)
        .block(Block::default().borders(Borders::ALL).title(title))
        .style(Style::default().fg(theme.text))
        .x_axis(
            Axis::default()
                .style(Style::default().fg(theme.dim))
                .bounds([0.0, max_x])
                .labels(vec![
                    Span::raw(first_label),
                    Span::raw(middle_label),
                    Span::raw(last_label),
                ]),
        )
        .y_axis(
            Axis::default()
                .style(Style::default().fg(theme.dim))
                .bounds([min_y, max_y])
                .labels(vec![
                    Span::raw(market::format_usd(min_y)),
                    Span::raw(market::format_usd(max_y)),
                ]),
        );

    f.render_widget(chart, chart_area);
}

fn render_loading(f: &mut Frame, area: Rect, theme: &Theme) {
    let loading = Paragraph::new("Loading market data...")
        .block(Block::default().borders(Borders::ALL).title("Market"))
        .style(Style::default().fg(theme.dim))
        .alignment(Alignment::Center);
    f.render_widget(loading, area);
}

fn render_notice(f: &mut Frame, notice: &str, theme: &Theme) {
    let popup_area = centered_rect(60, 20, f.area());
    f.render_widget(Clear, popup_area);

    let paragraph = Paragraph::new(notice)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Notice")
                .style(Style::default().fg(theme.down)),
        )
        .style(Style::default().fg(theme.text).bg(theme.background))
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });

    f.render_widget(paragraph, popup_area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(id: &str, cap: f64) -> Asset {
        Asset {
            id: id.to_string(),
            name: id.to_uppercase(),
            symbol: id[..1].to_string(),
            current_price: 10.0,
            price_change_percentage_24h: Some(1.0),
            market_cap: cap,
        }
    }

    fn app_with_snapshot(ids: &[&str]) -> App {
        let mut app = App::new(Store::temporary());
        let snapshot: Vec<Asset> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| asset(id, (1000 - i as i64) as f64))
            .collect();
        app.apply_snapshot(1, Ok(snapshot));
        app
    }

    #[test]
    fn test_sixth_add_surfaces_notice_and_leaves_set_unchanged() {
        let mut app = app_with_snapshot(&["a", "b", "c", "d", "e", "f"]);
        for id in ["a", "b", "c", "d", "e"] {
            app.add_to_comparison(id);
        }
        assert!(app.notice.is_none());

        app.add_to_comparison("f");
        assert_eq!(
            app.notice.as_deref(),
            Some("You can compare up to 5 cryptocurrencies.")
        );
        assert_eq!(app.comparison.ids(), ["a", "b", "c", "d", "e"]);
        assert_eq!(app.store.load_selection().len(), 5);
    }

    #[test]
    fn test_stale_snapshot_response_is_discarded() {
        let mut app = App::new(Store::temporary());
        assert!(app.apply_snapshot(2, Ok(vec![asset("fresh", 1.0)])));

        // overlapping refreshes can finish out of order; the older one loses
        assert!(!app.apply_snapshot(1, Ok(vec![asset("stale", 1.0)])));
        assert_eq!(app.snapshot[0].id, "fresh");
    }

    #[test]
    fn test_refresh_generations_can_overlap() {
        let app = App::new(Store::temporary());
        // two fetches issued back to back get distinct, increasing generations
        let first = app.refresh_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let second = app.refresh_counter.fetch_add(1, Ordering::SeqCst) + 1;
        assert!(second > first);
    }

    #[test]
    fn test_failed_refresh_keeps_previous_snapshot() {
        let mut app = App::new(Store::temporary());
        app.apply_snapshot(1, Ok(vec![asset("a", 1.0)]));

        let err = market::fetch_err_for_tests();
        assert!(app.apply_snapshot(2, Err(err)));
        assert_eq!(app.snapshot.len(), 1);
        assert_eq!(app.network_status, NetworkStatus::Disconnected);
    }

    #[test]
    fn test_superseded_chart_response_is_discarded() {
        let mut app = app_with_snapshot(&["a", "b"]);
        let first = app.begin_chart_request();
        let second = app.begin_chart_request();

        let stale = vec![TrendPoint {
            timestamp_ms: 0,
            price: 1.0,
        }];
        assert!(!app.apply_trend(first, "a", Ok(stale)));
        assert!(app.trend.is_empty());

        let fresh = vec![TrendPoint {
            timestamp_ms: 0,
            price: 2.0,
        }];
        assert!(app.apply_trend(second, "b", Ok(fresh)));
        assert_eq!(app.charted_id.as_deref(), Some("b"));
        assert_eq!(app.trend[0].price, 2.0);
    }

    #[test]
    fn test_failed_chart_fetch_leaves_previous_chart() {
        let mut app = app_with_snapshot(&["a"]);
        let generation = app.begin_chart_request();
        app.apply_trend(
            generation,
            "a",
            Ok(vec![TrendPoint {
                timestamp_ms: 0,
                price: 5.0,
            }]),
        );

        let next = app.begin_chart_request();
        let err = market::fetch_err_for_tests();
        assert!(!app.apply_trend(next, "a", Err(err)));
        assert_eq!(app.trend[0].price, 5.0);
        assert_eq!(app.charted_id.as_deref(), Some("a"));
    }

    #[test]
    fn test_theme_toggle_persists() {
        let mut app = App::new(Store::temporary());
        assert!(!app.dark_mode);
        app.toggle_theme();
        assert!(app.dark_mode);
        assert_eq!(app.theme, Theme::from_flag(true));
        assert!(app.store.load_dark_mode());
    }

    #[test]
    fn test_clear_comparison_removes_persisted_entry() {
        let mut app = app_with_snapshot(&["a", "b"]);
        app.add_to_comparison("a");
        assert!(app.store.selection_persisted());
        app.clear_comparison();
        assert!(app.comparison.is_empty());
        assert!(!app.store.selection_persisted());
    }

    #[test]
    fn test_selection_round_trips_across_restart() {
        let mut app = app_with_snapshot(&["a", "b", "c"]);
        app.add_to_comparison("c");
        app.add_to_comparison("a");

        // a fresh load from the same store restores the same ordered ids
        let restored = ComparisonSet::from_ids(app.store.load_selection());
        assert_eq!(restored.ids(), ["c", "a"]);
    }
}
