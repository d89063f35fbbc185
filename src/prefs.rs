//! Flat key-value persistence for relay state and names.
//!
//! Everything lands in the app's regular eframe storage scope, as plain
//! strings under fixed keys (`relay1`, `relay2`, `relay1_name`,
//! `relay2_name`), so a restart restores the switches before the device has
//! answered anything. Panel settings ride separately under
//! `eframe::APP_KEY`, see `app::PanelSettings`.

use crate::relay::{RelayId, RelayState};

pub fn load_relay(storage: &dyn eframe::Storage, relay: RelayId) -> RelayState {
    let is_on = storage
        .get_string(relay.key())
        .and_then(|v| v.parse::<bool>().ok())
        .unwrap_or(false);
    let name = storage
        .get_string(relay.name_key())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| relay.default_name().to_owned());
    RelayState { is_on, name }
}

pub fn save_relay_state(storage: &mut dyn eframe::Storage, relay: RelayId, is_on: bool) {
    storage.set_string(relay.key(), is_on.to_string());
    storage.flush();
}

pub fn save_relay_name(storage: &mut dyn eframe::Storage, relay: RelayId, name: &str) {
    storage.set_string(relay.name_key(), name.to_owned());
    storage.flush();
}

#[cfg(test)]
pub(crate) mod testutil {
    use std::collections::HashMap;

    /// In-memory stand-in for the on-disk eframe storage.
    #[derive(Default)]
    pub struct MemStorage {
        map: HashMap<String, String>,
    }

    impl MemStorage {
        pub fn get(&self, key: &str) -> Option<&str> {
            self.map.get(key).map(String::as_str)
        }
    }

    impl eframe::Storage for MemStorage {
        fn get_string(&self, key: &str) -> Option<String> {
            self.map.get(key).cloned()
        }

        fn set_string(&mut self, key: &str, value: String) {
            self.map.insert(key.to_owned(), value);
        }

        fn flush(&mut self) {}
    }
}
