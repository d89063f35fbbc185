use std::collections::HashMap;
use std::sync::mpsc::{Receiver, Sender};
use std::time::{Duration, Instant};

use crate::device::{DeviceCommand, DeviceEvent};
use crate::prefs;
use crate::relay::{CountdownTimer, RelayId, RelayState};
use crate::widgets;

const TOAST_TTL: Duration = Duration::from_millis(2500);

// Pages of the application.
#[derive(PartialEq, Copy, Clone, Debug)]
pub enum Page {
    Home,
    Settings,
}

/// Panel settings kept across restarts via the regular eframe app-state
/// blob. Relay state and names live next to it as flat keys, see `prefs`.
#[derive(serde::Deserialize, serde::Serialize, Clone, Debug)]
#[serde(default)]
pub struct PanelSettings {
    pub device_host: String,
}

impl Default for PanelSettings {
    fn default() -> Self {
        Self {
            device_host: "192.168.51.33".to_owned(),
        }
    }
}

struct Toast {
    text: String,
    expires_at: Instant,
}

enum Dialog {
    Rename { relay: RelayId, input: String },
    Timer { relay: RelayId, input: String },
}

pub struct RelayPanelApp {
    settings: PanelSettings,
    relays: [RelayState; 2],
    timers: HashMap<RelayId, CountdownTimer>,
    selected: Option<RelayId>,
    current_page: Page,
    dialog: Option<Dialog>,
    toast: Option<Toast>,
    command_tx: Sender<DeviceCommand>,
    event_rx: Receiver<DeviceEvent>,
}

impl RelayPanelApp {
    /// Called once before the first frame. Restores switch state and names
    /// from storage, then asks the device where the relays really are; the
    /// answers are applied in `update` without going through the toggle
    /// path.
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        command_tx: Sender<DeviceCommand>,
        event_rx: Receiver<DeviceEvent>,
    ) -> Self {
        let settings: PanelSettings = cc
            .storage
            .and_then(|storage| eframe::get_value(storage, eframe::APP_KEY))
            .unwrap_or_default();
        let relays = match cc.storage {
            Some(storage) => RelayId::ALL.map(|relay| prefs::load_relay(storage, relay)),
            None => RelayId::ALL.map(RelayState::default_for),
        };

        let app = Self::from_parts(settings, relays, command_tx, event_rx);
        app.fetch_states();
        app
    }

    fn from_parts(
        settings: PanelSettings,
        relays: [RelayState; 2],
        command_tx: Sender<DeviceCommand>,
        event_rx: Receiver<DeviceEvent>,
    ) -> Self {
        Self {
            settings,
            relays,
            timers: HashMap::new(),
            selected: None,
            current_page: Page::Home,
            dialog: None,
            toast: None,
            command_tx,
            event_rx,
        }
    }

    fn send(&self, cmd: DeviceCommand) {
        if self.command_tx.send(cmd).is_err() {
            log::error!("device worker is gone; dropping command");
        }
    }

    fn fetch_states(&self) {
        for relay in RelayId::ALL {
            self.send(DeviceCommand::FetchState {
                host: self.settings.device_host.clone(),
                relay,
            });
        }
    }

    /// User flipped a switch (the widget has already updated the bool):
    /// one request out, state persisted, any countdown on that relay killed.
    fn apply_toggle(&mut self, relay: RelayId, storage: Option<&mut (dyn eframe::Storage + 'static)>) {
        let on = self.relays[relay.index()].is_on;
        self.send(DeviceCommand::SetRelay {
            host: self.settings.device_host.clone(),
            relay,
            on,
        });
        if let Some(storage) = storage {
            prefs::save_relay_state(storage, relay, on);
        }
        self.cancel_timer(relay);
    }

    /// Device answered a state read. UI-only: no request back, no persist,
    /// and a running countdown keeps running.
    fn apply_event(&mut self, event: DeviceEvent) {
        match event {
            DeviceEvent::StateFetched { relay, is_on } => {
                self.relays[relay.index()].is_on = is_on;
            }
        }
    }

    fn apply_rename(
        &mut self,
        relay: RelayId,
        raw: &str,
        storage: Option<&mut (dyn eframe::Storage + 'static)>,
    ) -> bool {
        let name = raw.trim();
        if name.is_empty() {
            return false;
        }
        self.relays[relay.index()].name = name.to_owned();
        if let Some(storage) = storage {
            prefs::save_relay_name(storage, relay, name);
        }
        true
    }

    fn arm_timer(&mut self, relay: RelayId, secs: u64, now: Instant) {
        self.cancel_timer(relay);
        let initial = self.relays[relay.index()].is_on;
        self.timers
            .insert(relay, CountdownTimer::new(secs, initial, now));
    }

    fn cancel_timer(&mut self, relay: RelayId) {
        self.timers.remove(&relay);
    }

    fn arm_timer_from_input(&mut self, relay: RelayId, raw: &str, now: Instant) {
        let raw = raw.trim();
        if raw.is_empty() {
            return;
        }
        match raw.parse::<u64>() {
            Ok(secs) => {
                self.arm_timer(relay, secs, now);
                let name = self.relays[relay.index()].name.clone();
                let target = !self.relays[relay.index()].is_on;
                self.show_toast(armed_toast_text(&name, secs, target));
            }
            Err(_) => self.show_toast("Invalid duration".to_owned()),
        }
    }

    fn tick_timers(&mut self, now: Instant, mut storage: Option<&mut (dyn eframe::Storage + 'static)>) {
        let expired: Vec<(RelayId, CountdownTimer)> = self
            .timers
            .iter()
            .filter(|(_, timer)| timer.is_expired(now))
            .map(|(relay, timer)| (*relay, *timer))
            .collect();
        for (relay, timer) in expired {
            self.timers.remove(&relay);
            self.finish_timer(relay, timer, storage.as_mut().map(|s| &mut **s));
        }
    }

    /// Countdown hit zero: flip to the opposite of the arm-time state, same
    /// side effects as a user toggle minus the timer cancel.
    fn finish_timer(
        &mut self,
        relay: RelayId,
        timer: CountdownTimer,
        storage: Option<&mut (dyn eframe::Storage + 'static)>,
    ) {
        let target = timer.target_state();
        self.relays[relay.index()].is_on = target;
        self.send(DeviceCommand::SetRelay {
            host: self.settings.device_host.clone(),
            relay,
            on: target,
        });
        if let Some(storage) = storage {
            prefs::save_relay_state(storage, relay, target);
        }
        let text = format!(
            "Timer completed for {} - switched {}",
            self.relays[relay.index()].name,
            onoff(target)
        );
        self.show_toast(text);
    }

    fn show_toast(&mut self, text: String) {
        self.toast = Some(Toast {
            text,
            expires_at: Instant::now() + TOAST_TTL,
        });
    }

    fn top_bar(&mut self, ctx: &egui::Context, now: Instant) {
        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            egui::menu::bar(ui, |ui| {
                ui.selectable_value(&mut self.current_page, Page::Home, "Home");
                ui.selectable_value(&mut self.current_page, Page::Settings, "Settings");

                // Actions only exist while a relay card is selected.
                if let Some(relay) = self.selected {
                    ui.separator();
                    if ui.button("Rename").clicked() {
                        self.dialog = Some(Dialog::Rename {
                            relay,
                            input: String::new(),
                        });
                        self.selected = None;
                    }
                    if ui.button("Set timer").clicked() {
                        self.dialog = Some(Dialog::Timer {
                            relay,
                            input: String::new(),
                        });
                        self.selected = None;
                    }
                }

                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    for relay in RelayId::ALL {
                        if let Some(timer) = self.timers.get(&relay) {
                            ui.label(format!(
                                "{}: {}s",
                                self.relays[relay.index()].name,
                                timer.remaining_secs(now)
                            ));
                        }
                    }
                });
            });
        });
    }

    fn render_home_page(&mut self, ui: &mut egui::Ui, frame: &mut eframe::Frame) {
        for relay in RelayId::ALL {
            self.relay_card(ui, frame, relay);
            ui.add_space(8.0);
        }

        if self.selected.is_some() {
            ui.label(
                egui::RichText::new("Rename / Set timer via the menu bar")
                    .weak()
                    .small(),
            );
        }

        if ui.input(|i| i.key_pressed(egui::Key::Escape)) {
            self.selected = None;
        }
    }

    fn relay_card(&mut self, ui: &mut egui::Ui, frame: &mut eframe::Frame, relay: RelayId) {
        let idx = relay.index();
        let is_on = self.relays[idx].is_on;
        let selected = self.selected == Some(relay);

        let stroke = if selected {
            egui::Stroke::new(2.0, ui.visuals().selection.stroke.color)
        } else if is_on {
            egui::Stroke::new(1.5, egui::Color32::GREEN)
        } else {
            ui.visuals().widgets.noninteractive.bg_stroke
        };

        let egui::InnerResponse {
            inner: changed,
            response,
        } = ui.scope_builder(
            egui::UiBuilder::new()
                .id_salt(relay.key())
                .sense(egui::Sense::click()),
            |ui| {
                egui::Frame::group(ui.style())
                    .stroke(stroke)
                    .inner_margin(egui::Margin::symmetric(12, 10))
                    .show(ui, |ui| {
                        ui.set_min_width(ui.available_width());
                        ui.horizontal(|ui| {
                            ui.label(egui::RichText::new(&self.relays[idx].name).strong());
                            ui.with_layout(
                                egui::Layout::right_to_left(egui::Align::Center),
                                |ui| {
                                    let changed = ui
                                        .add(widgets::toggle(&mut self.relays[idx].is_on))
                                        .changed();
                                    let color = if self.relays[idx].is_on {
                                        egui::Color32::GREEN
                                    } else {
                                        ui.visuals().weak_text_color()
                                    };
                                    ui.colored_label(color, onoff(self.relays[idx].is_on));
                                    changed
                                },
                            )
                            .inner
                        })
                        .inner
                    })
                    .inner
            },
        );

        if changed {
            self.apply_toggle(relay, frame.storage_mut());
        }

        // Click on the card body selects the relay for the menu actions.
        if response.clicked() {
            self.selected = if selected { None } else { Some(relay) };
        }
    }

    fn render_settings_page(&mut self, ui: &mut egui::Ui) {
        ui.heading("Device");
        ui.horizontal(|ui| {
            ui.label("Device address:");
            ui.add(
                egui::TextEdit::singleline(&mut self.settings.device_host).desired_width(150.0),
            );
        });
        if ui.button("Read relay state").clicked() {
            self.fetch_states();
        }

        ui.add_space(20.0);

        ui.heading("Appearance");
        egui::widgets::global_theme_preference_buttons(ui);
    }

    fn show_dialog(&mut self, ctx: &egui::Context, frame: &mut eframe::Frame, now: Instant) {
        let Some(dialog) = self.dialog.take() else {
            return;
        };
        match dialog {
            Dialog::Rename { relay, mut input } => {
                let mut keep = true;
                let mut confirmed = false;
                egui::Window::new("Rename relay")
                    .collapsible(false)
                    .resizable(false)
                    .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
                    .show(ctx, |ui| {
                        let edit = ui.add(
                            egui::TextEdit::singleline(&mut input).hint_text("Enter new name"),
                        );
                        let submitted =
                            edit.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
                        ui.horizontal(|ui| {
                            if ui.button("OK").clicked() || submitted {
                                confirmed = true;
                                keep = false;
                            }
                            if ui.button("Cancel").clicked() {
                                keep = false;
                            }
                        });
                    });
                if confirmed {
                    self.apply_rename(relay, &input, frame.storage_mut());
                }
                if keep {
                    self.dialog = Some(Dialog::Rename { relay, input });
                }
            }
            Dialog::Timer { relay, mut input } => {
                let target = !self.relays[relay.index()].is_on;
                let mut keep = true;
                let mut confirmed = false;
                egui::Window::new("Set timer")
                    .collapsible(false)
                    .resizable(false)
                    .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
                    .show(ctx, |ui| {
                        ui.label(format!(
                            "Switch will turn {} after the timer expires",
                            onoff(target)
                        ));
                        let edit = ui.add(
                            egui::TextEdit::singleline(&mut input)
                                .hint_text("Enter timer duration (seconds)"),
                        );
                        let submitted =
                            edit.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
                        ui.horizontal(|ui| {
                            if ui.button("Set").clicked() || submitted {
                                confirmed = true;
                                keep = false;
                            }
                            if ui.button("Cancel").clicked() {
                                keep = false;
                            }
                        });
                    });
                if confirmed {
                    self.arm_timer_from_input(relay, &input, now);
                }
                if keep {
                    self.dialog = Some(Dialog::Timer { relay, input });
                }
            }
        }
    }

    fn show_toast_panel(&mut self, ctx: &egui::Context, now: Instant) {
        if self.toast.as_ref().is_some_and(|t| now >= t.expires_at) {
            self.toast = None;
        }
        let Some(toast) = &self.toast else {
            return;
        };
        egui::TopBottomPanel::bottom("toast").show(ctx, |ui| {
            ui.label(&toast.text);
        });
        ctx.request_repaint_after(toast.expires_at - now);
    }
}

impl eframe::App for RelayPanelApp {
    /// Called by the framework to save state before shutdown (and on its
    /// autosave cadence). Toggles and renames also write through directly;
    /// this is the backstop.
    fn save(&mut self, storage: &mut dyn eframe::Storage) {
        eframe::set_value(storage, eframe::APP_KEY, &self.settings);
        for relay in RelayId::ALL {
            let state = &self.relays[relay.index()];
            storage.set_string(relay.key(), state.is_on.to_string());
            storage.set_string(relay.name_key(), state.name.clone());
        }
    }

    fn update(&mut self, ctx: &egui::Context, frame: &mut eframe::Frame) {
        let now = Instant::now();

        // Answers from the device worker.
        while let Ok(event) = self.event_rx.try_recv() {
            self.apply_event(event);
        }

        self.tick_timers(now, frame.storage_mut());

        // Poll for worker answers even when idle; tighter while counting down.
        ctx.request_repaint_after(Duration::from_secs(1));
        if !self.timers.is_empty() {
            ctx.request_repaint_after(Duration::from_millis(250));
        }

        self.top_bar(ctx, now);

        egui::CentralPanel::default().show(ctx, |ui| {
            match self.current_page {
                Page::Home => self.render_home_page(ui, frame),
                Page::Settings => self.render_settings_page(ui),
            }

            ui.with_layout(egui::Layout::bottom_up(egui::Align::LEFT), |ui| {
                egui::warn_if_debug_build(ui);
            });
        });

        self.show_dialog(ctx, frame, now);
        self.show_toast_panel(ctx, now);
    }
}

fn onoff(on: bool) -> &'static str {
    if on {
        "ON"
    } else {
        "OFF"
    }
}

fn armed_toast_text(name: &str, secs: u64, target_on: bool) -> String {
    let delta = i64::try_from(secs)
        .ok()
        .and_then(chrono::TimeDelta::try_seconds)
        .unwrap_or(chrono::TimeDelta::MAX);
    match chrono::Local::now().checked_add_signed(delta) {
        Some(at) => format!(
            "Timer set for {secs}s - {name} will turn {} at {}",
            onoff(target_on),
            at.format("%H:%M:%S")
        ),
        None => format!(
            "Timer set for {secs}s - {name} will turn {}",
            onoff(target_on)
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefs::testutil::MemStorage;
    use std::sync::mpsc;

    fn test_app() -> (RelayPanelApp, mpsc::Receiver<DeviceCommand>) {
        let (command_tx, command_rx) = mpsc::channel();
        let (_event_tx, event_rx) = mpsc::channel();
        let relays = RelayId::ALL.map(RelayState::default_for);
        (
            RelayPanelApp::from_parts(PanelSettings::default(), relays, command_tx, event_rx),
            command_rx,
        )
    }

    #[test]
    fn user_toggle_requests_persists_and_cancels_countdown() {
        let (mut app, command_rx) = test_app();
        let mut storage = MemStorage::default();
        app.arm_timer(RelayId::Relay1, 60, Instant::now());

        // The switch widget flips the bool first; the handler does the rest.
        app.relays[0].is_on = true;
        app.apply_toggle(RelayId::Relay1, Some(&mut storage));

        match command_rx.try_recv().expect("toggle issues one request") {
            DeviceCommand::SetRelay { host, relay, on } => {
                assert_eq!(host, "192.168.51.33");
                assert_eq!(relay, RelayId::Relay1);
                assert!(on);
                assert_eq!(
                    crate::device::set_relay_url(&host, relay, on),
                    "http://192.168.51.33/relay1/on"
                );
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert!(
            command_rx.try_recv().is_err(),
            "exactly one request per toggle"
        );
        assert_eq!(storage.get("relay1"), Some("true"));
        assert!(app.timers.is_empty(), "toggling kills the countdown");
    }

    #[test]
    fn arming_replaces_any_prior_timer() {
        let (mut app, _command_rx) = test_app();
        let t0 = Instant::now();
        app.arm_timer(RelayId::Relay1, 100, t0);
        app.arm_timer(RelayId::Relay1, 5, t0);

        assert_eq!(app.timers.len(), 1);
        assert_eq!(app.timers[&RelayId::Relay1].remaining_secs(t0), 5);
    }

    #[test]
    fn timer_expiry_flips_to_negation_of_armed_state() {
        let (mut app, command_rx) = test_app();
        let mut storage = MemStorage::default();
        let t0 = Instant::now();

        // Relay is off at arm time -> it must end up on...
        app.arm_timer(RelayId::Relay2, 10, t0);
        // ...even if a state read lands mid-countdown claiming it is on.
        app.apply_event(DeviceEvent::StateFetched {
            relay: RelayId::Relay2,
            is_on: true,
        });

        app.tick_timers(t0 + Duration::from_secs(9), Some(&mut storage));
        assert!(app.timers.contains_key(&RelayId::Relay2));
        assert!(command_rx.try_recv().is_err());

        app.tick_timers(t0 + Duration::from_secs(10), Some(&mut storage));
        assert!(app.timers.is_empty());
        assert!(app.relays[1].is_on);
        match command_rx
            .try_recv()
            .expect("expiry issues the toggle request")
        {
            DeviceCommand::SetRelay { relay, on, .. } => {
                assert_eq!(relay, RelayId::Relay2);
                assert!(on);
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert!(command_rx.try_recv().is_err());
        assert_eq!(storage.get("relay2"), Some("true"));
        assert!(app.toast.is_some(), "completion is announced");
    }

    #[test]
    fn fetched_state_updates_ui_only() {
        let (mut app, command_rx) = test_app();
        app.arm_timer(RelayId::Relay1, 30, Instant::now());

        app.apply_event(DeviceEvent::StateFetched {
            relay: RelayId::Relay1,
            is_on: true,
        });

        assert!(app.relays[0].is_on);
        assert!(
            app.timers.contains_key(&RelayId::Relay1),
            "a state read must not cancel a countdown"
        );
        assert!(
            command_rx.try_recv().is_err(),
            "a state read must not echo a request back"
        );
    }

    #[test]
    fn rename_trims_persists_and_updates_display() {
        let (mut app, _command_rx) = test_app();
        let mut storage = MemStorage::default();

        assert!(app.apply_rename(RelayId::Relay2, "  Porch light  ", Some(&mut storage)));

        assert_eq!(app.relays[1].name, "Porch light");
        assert_eq!(storage.get("relay2_name"), Some("Porch light"));
    }

    #[test]
    fn blank_rename_is_rejected() {
        let (mut app, _command_rx) = test_app();
        assert!(!app.apply_rename(RelayId::Relay1, "   ", None));
        assert_eq!(app.relays[0].name, "Relay 1");
    }

    #[test]
    fn valid_timer_input_arms_and_toasts() {
        let (mut app, command_rx) = test_app();
        let now = Instant::now();
        app.relays[0].is_on = true;

        app.arm_timer_from_input(RelayId::Relay1, " 45 ", now);

        let timer = app.timers[&RelayId::Relay1];
        assert_eq!(timer.remaining_secs(now), 45);
        assert!(!timer.target_state(), "on at arm time -> timer turns it off");
        assert!(
            command_rx.try_recv().is_err(),
            "arming sends nothing until expiry"
        );
        assert!(app.toast.is_some());
    }

    #[test]
    fn invalid_timer_input_toasts_and_arms_nothing() {
        let (mut app, command_rx) = test_app();
        let now = Instant::now();

        app.arm_timer_from_input(RelayId::Relay1, "soon", now);
        assert!(app.timers.is_empty());
        assert!(app.toast.is_some());
        assert!(command_rx.try_recv().is_err());

        app.toast = None;
        app.arm_timer_from_input(RelayId::Relay1, "   ", now);
        assert!(app.timers.is_empty());
        assert!(app.toast.is_none(), "empty input is a silent no-op");
    }

    #[test]
    fn restart_restores_relays_before_any_network_answer() {
        let mut storage = MemStorage::default();
        prefs::save_relay_state(&mut storage, RelayId::Relay2, true);
        prefs::save_relay_name(&mut storage, RelayId::Relay2, "Heater");

        let relays = RelayId::ALL.map(|relay| prefs::load_relay(&storage, relay));
        let (command_tx, _command_rx) = mpsc::channel();
        let (_event_tx, event_rx) = mpsc::channel();
        let app = RelayPanelApp::from_parts(PanelSettings::default(), relays, command_tx, event_rx);

        assert!(!app.relays[0].is_on);
        assert_eq!(app.relays[0].name, "Relay 1");
        assert!(app.relays[1].is_on);
        assert_eq!(app.relays[1].name, "Heater");
    }
}
