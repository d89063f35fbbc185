#![warn(clippy::all, rust_2018_idioms)]
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")] // hide console window on Windows in release

mod app;
mod device;
mod prefs;
mod relay;
mod widgets;

use std::sync::mpsc;

fn main() -> eframe::Result {
    env_logger::init();

    let (command_tx, command_rx) = mpsc::channel();
    let (event_tx, event_rx) = mpsc::channel();

    // All device traffic happens on its own thread; the GUI only ever
    // touches the two channel ends.
    std::thread::spawn(move || {
        let runtime = tokio::runtime::Runtime::new().expect("failed to start tokio runtime");
        runtime.block_on(device::device_worker(command_rx, event_tx));
    });

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([400.0, 320.0])
            .with_min_inner_size([320.0, 240.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Relay Panel",
        native_options,
        Box::new(|cc| Ok(Box::new(app::RelayPanelApp::new(cc, command_tx, event_rx)))),
    )
}
