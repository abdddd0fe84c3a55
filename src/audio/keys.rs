//! Key events for push-to-talk.
//!
//! A [`KeySource`] hands out subscriptions: a receiver of key-down/key-up
//! events that only receives while the subscription is alive.

use crate::error::{AssistantError, Result};
use crossbeam_channel::{Receiver, Sender, unbounded};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Keys that can be bound to the trigger or quit action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Key {
    Space,
    Escape,
    Enter,
    Tab,
    ControlLeft,
    ControlRight,
    ShiftLeft,
    ShiftRight,
    AltLeft,
    AltRight,
    F(u8),
    Letter(char),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Space => write!(f, "Space"),
            Key::Escape => write!(f, "Escape"),
            Key::Enter => write!(f, "Enter"),
            Key::Tab => write!(f, "Tab"),
            Key::ControlLeft => write!(f, "ControlLeft"),
            Key::ControlRight => write!(f, "ControlRight"),
            Key::ShiftLeft => write!(f, "ShiftLeft"),
            Key::ShiftRight => write!(f, "ShiftRight"),
            Key::AltLeft => write!(f, "AltLeft"),
            Key::AltRight => write!(f, "AltRight"),
            Key::F(n) => write!(f, "F{}", n),
            Key::Letter(c) => write!(f, "{}", c.to_ascii_uppercase()),
        }
    }
}

impl FromStr for Key {
    type Err = AssistantError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase().replace(['_', '-', ' '], "");
        let key = match normalized.as_str() {
            "space" => Key::Space,
            "escape" | "esc" => Key::Escape,
            "enter" | "return" => Key::Enter,
            "tab" => Key::Tab,
            "controlleft" | "ctrlleft" | "leftctrl" | "leftcontrol" => Key::ControlLeft,
            "controlright" | "ctrlright" | "rightctrl" | "rightcontrol" => Key::ControlRight,
            "shiftleft" | "leftshift" => Key::ShiftLeft,
            "shiftright" | "rightshift" => Key::ShiftRight,
            "altleft" | "leftalt" | "alt" => Key::AltLeft,
            "altright" | "rightalt" | "altgr" => Key::AltRight,
            other => {
                if let Some(n) = other.strip_prefix('f').and_then(|n| n.parse::<u8>().ok())
                    && (1..=12).contains(&n)
                {
                    Key::F(n)
                } else if other.len() == 1
                    && let Some(c) = other.chars().next()
                    && c.is_ascii_lowercase()
                {
                    Key::Letter(c)
                } else {
                    return Err(AssistantError::ConfigInvalidValue {
                        key: "key".to_string(),
                        message: format!("unknown key name '{}'", s),
                    });
                }
            }
        };
        Ok(key)
    }
}

impl TryFrom<String> for Key {
    type Error = AssistantError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Key> for String {
    fn from(key: Key) -> Self {
        key.to_string()
    }
}

/// A key transition observed by the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEvent {
    Pressed(Key),
    Released(Key),
}

type Slot = Arc<Mutex<Option<Sender<KeyEvent>>>>;

/// Live key event stream. Dropping it stops delivery.
pub struct KeySubscription {
    events: Receiver<KeyEvent>,
    slot: Slot,
}

impl KeySubscription {
    fn attached(events: Receiver<KeyEvent>, slot: Slot) -> Self {
        Self { events, slot }
    }

    pub fn events(&self) -> &Receiver<KeyEvent> {
        &self.events
    }
}

impl Drop for KeySubscription {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.slot.lock() {
            guard.take();
        }
    }
}

/// Subscription slot and failure state shared with a listener thread.
#[derive(Clone, Default)]
#[cfg_attr(not(feature = "keyboard"), allow(dead_code))]
struct ListenerState {
    slot: Slot,
    failure: Arc<Mutex<Option<String>>>,
}

#[cfg_attr(not(feature = "keyboard"), allow(dead_code))]
impl ListenerState {
    /// Install a new subscriber, then check for a recorded failure.
    ///
    /// A failure recorded after the install drops the new sender through
    /// [`ListenerState::fail`], so the subscriber is never left waiting on a
    /// dead listener.
    fn attach(&self) -> Result<KeySubscription> {
        let (tx, rx) = unbounded();
        {
            let mut guard = self.slot.lock().map_err(|e| AssistantError::KeyListener {
                message: format!("Failed to lock subscription slot: {}", e),
            })?;
            *guard = Some(tx);
        }

        let failure = self
            .failure
            .lock()
            .map_err(|e| AssistantError::KeyListener {
                message: format!("Failed to lock listener state: {}", e),
            })?
            .clone();
        if let Some(message) = failure {
            if let Ok(mut guard) = self.slot.lock() {
                guard.take();
            }
            return Err(AssistantError::KeyListener { message });
        }
        Ok(KeySubscription::attached(rx, Arc::clone(&self.slot)))
    }

    /// Record a listener failure and disconnect the active subscriber.
    fn fail(&self, message: String) {
        if let Ok(mut guard) = self.failure.lock() {
            *guard = Some(message);
        }
        if let Ok(mut guard) = self.slot.lock() {
            guard.take();
        }
    }

    fn forward(&self, event: KeyEvent) {
        if let Ok(guard) = self.slot.lock()
            && let Some(tx) = guard.as_ref()
        {
            let _ = tx.send(event);
        }
    }
}

/// Source of key events.
pub trait KeySource: Send + Sync {
    /// Start receiving key events. Only events after this call are delivered.
    fn subscribe(&self) -> Result<KeySubscription>;
}

/// One step of a scripted key sequence.
#[derive(Debug, Clone, Copy)]
pub struct ScriptedKey {
    pub delay: Duration,
    pub event: KeyEvent,
}

/// Test key source replaying a fixed sequence on every subscription.
///
/// Each step waits `delay` after the previous one. When `hold_open` is set the
/// stream stays connected after the script ends, like a real keyboard.
#[derive(Debug, Clone, Default)]
pub struct ScriptedKeySource {
    script: Vec<ScriptedKey>,
    hold_open: bool,
}

impl ScriptedKeySource {
    pub fn new() -> Self {
        Self {
            script: Vec::new(),
            hold_open: true,
        }
    }

    pub fn then(mut self, delay: Duration, event: KeyEvent) -> Self {
        self.script.push(ScriptedKey { delay, event });
        self
    }

    pub fn press(self, delay: Duration, key: Key) -> Self {
        self.then(delay, KeyEvent::Pressed(key))
    }

    pub fn release(self, delay: Duration, key: Key) -> Self {
        self.then(delay, KeyEvent::Released(key))
    }

    /// Disconnect the stream once the script is exhausted.
    pub fn disconnect_after_script(mut self) -> Self {
        self.hold_open = false;
        self
    }
}

impl KeySource for ScriptedKeySource {
    fn subscribe(&self) -> Result<KeySubscription> {
        let (tx, rx) = unbounded();
        let slot: Slot = Arc::new(Mutex::new(Some(tx)));
        let script = self.script.clone();
        let hold_open = self.hold_open;
        let feeder = Arc::clone(&slot);

        thread::spawn(move || {
            for step in script {
                thread::sleep(step.delay);
                let Ok(guard) = feeder.lock() else { return };
                match guard.as_ref() {
                    Some(tx) => {
                        let _ = tx.send(step.event);
                    }
                    None => return,
                }
            }
            if !hold_open && let Ok(mut guard) = feeder.lock() {
                guard.take();
            }
        });

        Ok(KeySubscription::attached(rx, slot))
    }
}

/// Global keyboard listener backed by `rdev`.
///
/// `rdev::listen` never returns while it works, so one listener thread is
/// started on first use and lives for the rest of the process. It forwards
/// events only into the currently active subscription.
#[cfg(feature = "keyboard")]
pub struct RdevKeySource {
    state: ListenerState,
    started: std::sync::Once,
}

#[cfg(feature = "keyboard")]
impl RdevKeySource {
    pub fn new() -> Self {
        Self {
            state: ListenerState::default(),
            started: std::sync::Once::new(),
        }
    }

    fn ensure_listener(&self) {
        self.started.call_once(|| {
            let state = self.state.clone();
            let spawned = thread::Builder::new()
                .name("key-listener".to_string())
                .spawn(move || {
                    let forward = state.clone();
                    let result = rdev::listen(move |event: rdev::Event| {
                        let key_event = match event.event_type {
                            rdev::EventType::KeyPress(k) => from_rdev(k).map(KeyEvent::Pressed),
                            rdev::EventType::KeyRelease(k) => from_rdev(k).map(KeyEvent::Released),
                            _ => None,
                        };
                        if let Some(key_event) = key_event {
                            forward.forward(key_event);
                        }
                    });
                    if let Err(e) = result {
                        tracing::error!("key listener stopped: {:?}", e);
                        state.fail(format!("{:?}", e));
                    }
                });
            if let Err(e) = spawned {
                self.state
                    .fail(format!("failed to spawn listener thread: {}", e));
            }
        });
    }
}

#[cfg(feature = "keyboard")]
impl Default for RdevKeySource {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "keyboard")]
impl KeySource for RdevKeySource {
    fn subscribe(&self) -> Result<KeySubscription> {
        self.ensure_listener();
        self.state.attach()
    }
}

#[cfg(feature = "keyboard")]
fn from_rdev(key: rdev::Key) -> Option<Key> {
    use rdev::Key as R;
    let mapped = match key {
        R::Space => Key::Space,
        R::Escape => Key::Escape,
        R::Return => Key::Enter,
        R::Tab => Key::Tab,
        R::ControlLeft => Key::ControlLeft,
        R::ControlRight => Key::ControlRight,
        R::ShiftLeft => Key::ShiftLeft,
        R::ShiftRight => Key::ShiftRight,
        R::Alt => Key::AltLeft,
        R::AltGr => Key::AltRight,
        R::F1 => Key::F(1),
        R::F2 => Key::F(2),
        R::F3 => Key::F(3),
        R::F4 => Key::F(4),
        R::F5 => Key::F(5),
        R::F6 => Key::F(6),
        R::F7 => Key::F(7),
        R::F8 => Key::F(8),
        R::F9 => Key::F(9),
        R::F10 => Key::F(10),
        R::F11 => Key::F(11),
        R::F12 => Key::F(12),
        R::KeyA => Key::Letter('a'),
        R::KeyB => Key::Letter('b'),
        R::KeyC => Key::Letter('c'),
        R::KeyD => Key::Letter('d'),
        R::KeyE => Key::Letter('e'),
        R::KeyF => Key::Letter('f'),
        R::KeyG => Key::Letter('g'),
        R::KeyH => Key::Letter('h'),
        R::KeyI => Key::Letter('i'),
        R::KeyJ => Key::Letter('j'),
        R::KeyK => Key::Letter('k'),
        R::KeyL => Key::Letter('l'),
        R::KeyM => Key::Letter('m'),
        R::KeyN => Key::Letter('n'),
        R::KeyO => Key::Letter('o'),
        R::KeyP => Key::Letter('p'),
        R::KeyQ => Key::Letter('q'),
        R::KeyR => Key::Letter('r'),
        R::KeyS => Key::Letter('s'),
        R::KeyT => Key::Letter('t'),
        R::KeyU => Key::Letter('u'),
        R::KeyV => Key::Letter('v'),
        R::KeyW => Key::Letter('w'),
        R::KeyX => Key::Letter('x'),
        R::KeyY => Key::Letter('y'),
        R::KeyZ => Key::Letter('z'),
        _ => return None,
    };
    Some(mapped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_named_keys_case_insensitively() {
        assert_eq!("ControlRight".parse::<Key>().unwrap(), Key::ControlRight);
        assert_eq!("right_ctrl".parse::<Key>().unwrap(), Key::ControlRight);
        assert_eq!("esc".parse::<Key>().unwrap(), Key::Escape);
        assert_eq!("SPACE".parse::<Key>().unwrap(), Key::Space);
        assert_eq!("f9".parse::<Key>().unwrap(), Key::F(9));
        assert_eq!("q".parse::<Key>().unwrap(), Key::Letter('q'));
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!("F13".parse::<Key>().is_err());
        assert!("hyper".parse::<Key>().is_err());
        assert!("1".parse::<Key>().is_err());
    }

    #[test]
    fn display_parses_back() {
        for key in [
            Key::ControlRight,
            Key::Escape,
            Key::F(12),
            Key::Letter('x'),
            Key::AltRight,
        ] {
            assert_eq!(key.to_string().parse::<Key>().unwrap(), key);
        }
    }

    #[test]
    fn serde_uses_key_names() {
        #[derive(Serialize, Deserialize)]
        struct Binding {
            key: Key,
        }
        let parsed: Binding = toml::from_str("key = \"Escape\"").unwrap();
        assert_eq!(parsed.key, Key::Escape);
        assert!(toml::from_str::<Binding>("key = \"nope\"").is_err());
    }

    #[test]
    fn scripted_source_replays_in_order() {
        let source = ScriptedKeySource::new()
            .press(Duration::from_millis(1), Key::Space)
            .release(Duration::from_millis(1), Key::Space);
        let sub = source.subscribe().unwrap();
        let timeout = Duration::from_secs(1);
        assert_eq!(
            sub.events().recv_timeout(timeout).unwrap(),
            KeyEvent::Pressed(Key::Space)
        );
        assert_eq!(
            sub.events().recv_timeout(timeout).unwrap(),
            KeyEvent::Released(Key::Space)
        );
    }

    #[test]
    fn scripted_source_can_disconnect() {
        let source = ScriptedKeySource::new()
            .press(Duration::from_millis(1), Key::Space)
            .disconnect_after_script();
        let sub = source.subscribe().unwrap();
        let timeout = Duration::from_secs(1);
        assert!(sub.events().recv_timeout(timeout).is_ok());
        assert!(matches!(
            sub.events().recv_timeout(timeout),
            Err(crossbeam_channel::RecvTimeoutError::Disconnected)
        ));
    }

    #[test]
    fn listener_state_forwards_to_live_subscriber() {
        let state = ListenerState::default();
        let sub = state.attach().unwrap();
        state.forward(KeyEvent::Pressed(Key::F(9)));
        assert_eq!(
            sub.events().recv_timeout(Duration::from_secs(1)).unwrap(),
            KeyEvent::Pressed(Key::F(9))
        );
    }

    #[test]
    fn attach_after_listener_failure_is_an_error() {
        let state = ListenerState::default();
        state.fail("no display".to_string());

        match state.attach() {
            Err(AssistantError::KeyListener { message }) => assert_eq!(message, "no display"),
            Err(other) => panic!("Expected KeyListener, got {:?}", other),
            Ok(_) => panic!("Expected KeyListener"),
        }
        assert!(state.slot.lock().unwrap().is_none());
    }

    #[test]
    fn listener_failure_disconnects_attached_subscriber() {
        let state = ListenerState::default();
        let sub = state.attach().unwrap();

        let listener = state.clone();
        let failing = thread::spawn(move || listener.fail("listen failed".to_string()));
        failing.join().unwrap();

        assert!(matches!(
            sub.events().recv_timeout(Duration::from_secs(1)),
            Err(crossbeam_channel::RecvTimeoutError::Disconnected)
        ));
    }

    #[test]
    fn dropped_subscription_stops_delivery() {
        let (tx, rx) = unbounded::<KeyEvent>();
        let slot: Slot = Arc::new(Mutex::new(Some(tx)));
        let sub = KeySubscription::attached(rx, Arc::clone(&slot));
        drop(sub);
        assert!(slot.lock().unwrap().is_none());
    }
}
