//! Kestrel Desktop: application entry.

mod app;

use eframe::egui;

fn main() -> eframe::Result<()> {
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([640.0, 560.0])
            .with_min_inner_size([480.0, 400.0]),
        ..Default::default()
    };
    eframe::run_native(
        "Accomplishment Categorizer",
        options,
        Box::new(|cc| Box::new(app::KestrelApp::new(cc))),
    )
}
