//! Kestrel Desktop: egui app state and UI.

use anyhow::Context;
use eframe::egui;
use lib::config::Config;
use lib::dispatch::{Dispatcher, TaskEvent, TaskKind};
use lib::models::Models;
use std::collections::VecDeque;
use std::sync::mpsc;
use std::sync::{Arc, Mutex, OnceLock};

const INPUT_HEIGHT: f32 = 140.0;
const LOG_BUFFER_MAX_LINES: usize = 2000;

/// Ring buffer of log lines for the Logs screen. Written by DesktopLogger.
static LOG_LINES: OnceLock<Mutex<VecDeque<String>>> = OnceLock::new();

fn log_buffer() -> &'static Mutex<VecDeque<String>> {
    LOG_LINES.get_or_init(|| Mutex::new(VecDeque::new()))
}

fn push_log_line(line: String) {
    if let Ok(mut buf) = log_buffer().lock() {
        buf.push_back(line);
        while buf.len() > LOG_BUFFER_MAX_LINES {
            buf.pop_front();
        }
    }
}

/// Logger that appends to LOG_LINES for display in the Logs screen.
struct DesktopLogger;

impl log::Log for DesktopLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        // reqwest/hyper internals drown out our own lines at debug.
        metadata.level() <= log::Level::Info || metadata.target().starts_with("lib")
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        push_log_line(format!(
            "{} [{}] {}",
            clock_time(),
            record.level(),
            record.args()
        ));
    }

    fn flush(&self) {}
}

/// UTC wall-clock time as HH:MM:SS.mmm.
fn clock_time() -> String {
    let t = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    let secs = t.as_secs();
    format!(
        "{:02}:{:02}:{:02}.{:03}",
        (secs / 3600) % 24,
        (secs / 60) % 60,
        secs % 60,
        t.subsec_millis()
    )
}

static LOGGER: DesktopLogger = DesktopLogger;

#[derive(Clone, Copy, PartialEq, Eq, Default)]
enum Screen {
    #[default]
    Text,
    Logs,
}

/// Status, results and summary of the current run. One run at a time: a new run
/// can only start once every task of the previous one has reported back.
#[derive(Debug, Default)]
struct RunState {
    status: String,
    results: Vec<String>,
    summary: Option<String>,
    /// Tasks started but not yet reported back.
    pending: usize,
    failure: Option<String>,
}

impl RunState {
    fn busy(&self) -> bool {
        self.pending > 0
    }

    fn begin_categorize(&mut self, tasks: usize) {
        self.results.clear();
        self.failure = None;
        self.pending = tasks;
        self.status = format!("Categorizing {} line(s)…", tasks);
    }

    fn begin_summarize(&mut self) {
        self.summary = None;
        self.failure = None;
        self.pending = 1;
        self.status = "Summarizing…".to_string();
    }

    fn apply(&mut self, event: TaskEvent) {
        if !self.busy() {
            log::debug!("dropping {} result with no run in progress", event.kind.as_str());
            return;
        }
        self.pending -= 1;
        match (event.kind, event.outcome) {
            (TaskKind::Categorize, Ok(line)) => self.results.push(line),
            (TaskKind::Categorize, Err(e)) => self.results.push(format!("(failed) {}", e)),
            (TaskKind::Summarize, Ok(summary)) => self.summary = Some(summary),
            (TaskKind::Summarize, Err(e)) => {
                self.failure = Some(format!("Summarization failed: {}", e));
            }
        }
        if !self.busy() {
            self.status = self.failure.take().unwrap_or_else(|| "Done.".to_string());
        }
    }
}

/// Load config and warm up both models. Runs off the UI thread.
fn init_models(config: &Config) -> anyhow::Result<Models> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building init runtime")?;
    let models = rt.block_on(Models::init(config))?;
    Ok(models)
}

pub struct KestrelApp {
    current_screen: Screen,
    input: String,
    run: RunState,
    max_concurrent: usize,
    init_receiver: Option<mpsc::Receiver<Result<Models, String>>>,
    dispatcher: Option<Dispatcher>,
    events: Option<mpsc::Receiver<TaskEvent>>,
}

impl KestrelApp {
    /// Space between the screen title and the content below.
    const SCREEN_TITLE_BOTTOM_SPACING: f32 = 18.0;
    /// Space between the bottom of the content and the window edge.
    const SCREEN_FOOTER_SPACING: f32 = 48.0;

    pub fn new(cc: &eframe::CreationContext<'_>) -> Self {
        let _ = log::set_logger(&LOGGER);
        log::set_max_level(log::LevelFilter::Debug);
        log::info!("desktop started");

        let config = match lib::config::load_config(None) {
            Ok((config, path)) => {
                log::info!("config loaded from {}", path.display());
                config
            }
            Err(e) => {
                log::warn!("config not loaded, using defaults: {:#}", e);
                Config::default()
            }
        };
        let max_concurrent = config.dispatch.max_concurrent;

        let (tx, rx) = mpsc::channel();
        let ctx = cc.egui_ctx.clone();
        std::thread::spawn(move || {
            let result = init_models(&config).map_err(|e| format!("{:#}", e));
            let _ = tx.send(result);
            ctx.request_repaint();
        });

        Self {
            current_screen: Screen::default(),
            input: String::new(),
            run: RunState {
                status: "Loading models…".to_string(),
                ..RunState::default()
            },
            max_concurrent,
            init_receiver: Some(rx),
            dispatcher: None,
            events: None,
        }
    }

    /// Install the dispatcher once model initialization reports back. Call each frame.
    fn poll_init(&mut self, ctx: &egui::Context) {
        let Some(rx) = &self.init_receiver else {
            return;
        };
        let result = match rx.try_recv() {
            Ok(result) => result,
            Err(mpsc::TryRecvError::Empty) => return,
            Err(mpsc::TryRecvError::Disconnected) => Err("model loader exited".to_string()),
        };
        self.init_receiver = None;
        match result {
            Ok(models) => match Dispatcher::new(Arc::new(models), self.max_concurrent) {
                Ok((dispatcher, events)) => {
                    let repaint = ctx.clone();
                    self.dispatcher = Some(dispatcher.with_notify(move || repaint.request_repaint()));
                    self.events = Some(events);
                    self.run.status = "Models ready.".to_string();
                    log::info!("models ready");
                }
                Err(e) => {
                    self.run.status = format!("Could not start worker runtime: {}", e);
                    log::error!("dispatch runtime: {}", e);
                }
            },
            Err(e) => {
                self.run.status = format!("Model initialization failed: {}", e);
                log::error!("model init: {}", e);
            }
        }
    }

    /// Drain finished tasks into the results list and summary.
    fn poll_events(&mut self) {
        let Some(rx) = &self.events else {
            return;
        };
        while let Ok(event) = rx.try_recv() {
            self.run.apply(event);
        }
    }

    fn categorize(&mut self) {
        let Some(dispatcher) = &self.dispatcher else {
            return;
        };
        if self.run.busy() {
            return;
        }
        match dispatcher.categorize(&self.input) {
            Ok(n) => self.run.begin_categorize(n),
            Err(e) => self.run.status = e.to_string(),
        }
    }

    fn summarize(&mut self) {
        let Some(dispatcher) = &self.dispatcher else {
            return;
        };
        if self.run.busy() {
            return;
        }
        match dispatcher.summarize(&self.input) {
            Ok(()) => self.run.begin_summarize(),
            Err(e) => self.run.status = e.to_string(),
        }
    }

    fn ui_text_screen(&mut self, ui: &mut egui::Ui) {
        ui.add_space(24.0);
        ui.heading("Accomplishments");
        ui.add_space(Self::SCREEN_TITLE_BOTTOM_SPACING);

        egui::ScrollArea::vertical()
            .id_source("input_scroll")
            .max_height(INPUT_HEIGHT)
            .show(ui, |ui| {
                ui.add_sized(
                    [ui.available_width(), INPUT_HEIGHT],
                    egui::TextEdit::multiline(&mut self.input)
                        .hint_text("Enter accomplishments, one per line..."),
                );
            });
        ui.add_space(8.0);

        let loaded = self.dispatcher.is_some();
        let ready = loaded && !self.run.busy();
        ui.horizontal(|ui| {
            if ui.add_enabled(ready, egui::Button::new("Categorize")).clicked() {
                self.categorize();
            }
            if ui.add_enabled(ready, egui::Button::new("Summarize")).clicked() {
                self.summarize();
            }
            if self.init_receiver.is_some() || self.run.busy() {
                ui.spinner();
            }
        });
        ui.add_space(8.0);
        ui.label(self.run.status.as_str());
        ui.add_space(16.0);

        ui.strong("Results");
        ui.add_space(4.0);
        let scroll_height = (ui.available_height() - 120.0).max(60.0);
        egui::ScrollArea::vertical()
            .id_source("results_scroll")
            .max_height(scroll_height)
            .auto_shrink([false, true])
            .show(ui, |ui| {
                if self.run.results.is_empty() {
                    ui.weak("No results yet.");
                }
                for line in &self.run.results {
                    ui.label(line.as_str());
                }
            });
        ui.add_space(16.0);

        ui.strong("Summary");
        ui.add_space(4.0);
        match &self.run.summary {
            Some(summary) => {
                ui.label(summary.as_str());
            }
            None => {
                ui.weak("No summary yet.");
            }
        }
    }

    fn ui_logs_screen(&self, ui: &mut egui::Ui) {
        ui.add_space(24.0);
        ui.heading("Logs");
        ui.add_space(Self::SCREEN_TITLE_BOTTOM_SPACING);

        let lines: Vec<String> = log_buffer()
            .lock()
            .map(|b| b.iter().cloned().collect())
            .unwrap_or_default();

        let available = ui.available_height();
        let scroll_height = (available - Self::SCREEN_FOOTER_SPACING).max(0.0);
        egui::ScrollArea::vertical()
            .max_height(scroll_height)
            .stick_to_bottom(true)
            .show(ui, |ui| {
                for line in &lines {
                    ui.label(
                        egui::RichText::new(line.as_str()).family(egui::FontFamily::Monospace),
                    );
                }
                if lines.is_empty() {
                    ui.label("No log output yet.");
                }
            });
        ui.add_space(Self::SCREEN_FOOTER_SPACING);
    }
}

impl eframe::App for KestrelApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_init(ctx);
        self.poll_events();

        let current_screen = &mut self.current_screen;
        egui::SidePanel::left("sidebar")
            .resizable(false)
            .exact_width(120.0)
            .show(ctx, |ui| {
                egui::Frame::none()
                    .inner_margin(egui::Margin::symmetric(24.0, 0.0))
                    .show(ui, |ui| {
                        ui.add_space(24.0);
                        if ui.selectable_label(*current_screen == Screen::Text, "Text").clicked() {
                            *current_screen = Screen::Text;
                        }
                        ui.add_space(12.0);
                        if ui.selectable_label(*current_screen == Screen::Logs, "Logs").clicked() {
                            *current_screen = Screen::Logs;
                        }
                    });
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            egui::Frame::none()
                .inner_margin(egui::Margin::symmetric(24.0, 0.0))
                .show(ui, |ui| match self.current_screen {
                    Screen::Text => self.ui_text_screen(ui),
                    Screen::Logs => self.ui_logs_screen(ui),
                });
        });
    }
}
