//! Global hotkey registration and event filtering.
//!
//! One binding slot: the manager owns at most one system-wide key
//! combination at a time. Binding text like `"Ctrl+Win+J"` is parsed into
//! modifier flags plus exactly one trigger key; parsing is order-independent
//! and case-insensitive. Registration failures are reported through the
//! returned `Result`, never raised as fatal — the app keeps running without
//! a hotkey if the OS refuses the binding.

use global_hotkey::hotkey::{Code, HotKey, Modifiers};
use global_hotkey::{GlobalHotKeyEvent, GlobalHotKeyManager, HotKeyState};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum HotkeyError {
    #[error("invalid hotkey binding {binding:?}: {reason}")]
    Parse { binding: String, reason: String },
    #[error("hotkey registration denied by the OS: {0}")]
    Denied(String),
}

/// A parsed hotkey binding: modifier flags plus exactly one trigger key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    modifiers: Modifiers,
    trigger: Code,
    text: String,
}

impl Binding {
    /// Parse binding text by splitting on `+`.
    ///
    /// Each token is either a modifier name (`Ctrl`/`Control`, `Alt`,
    /// `Shift`, `Win`/`Windows`) or a single alphanumeric character naming
    /// the trigger key. Empty tokens are skipped. Anything else, a missing
    /// trigger, or a second trigger is an error.
    pub fn parse(text: &str) -> Result<Self, HotkeyError> {
        let parse_err = |reason: &str| HotkeyError::Parse {
            binding: text.to_string(),
            reason: reason.to_string(),
        };

        let mut modifiers = Modifiers::empty();
        let mut trigger = None;

        for token in text.split('+') {
            let token = token.trim().to_uppercase();
            match token.as_str() {
                "" => {}
                "CTRL" | "CONTROL" => modifiers |= Modifiers::CONTROL,
                "ALT" => modifiers |= Modifiers::ALT,
                "SHIFT" => modifiers |= Modifiers::SHIFT,
                // keyboard-types carries both META and SUPER for the OS key;
                // set both so every platform layer sees the one it checks.
                "WIN" | "WINDOWS" => modifiers |= Modifiers::META | Modifiers::SUPER,
                other => {
                    let code = trigger_code(other).ok_or_else(|| {
                        parse_err(&format!("unrecognized token {other:?}"))
                    })?;
                    if trigger.replace(code).is_some() {
                        return Err(parse_err("more than one trigger key"));
                    }
                }
            }
        }

        let trigger = trigger.ok_or_else(|| parse_err("no trigger key"))?;
        Ok(Self {
            modifiers,
            trigger,
            text: text.to_string(),
        })
    }

    /// The original binding text this was parsed from.
    pub fn text(&self) -> &str {
        &self.text
    }

    fn hotkey(&self) -> HotKey {
        HotKey::new(Some(self.modifiers), self.trigger)
    }
}

/// Key code for a single-character trigger token (A-Z, 0-9).
fn trigger_code(token: &str) -> Option<Code> {
    let mut chars = token.chars();
    let c = chars.next()?;
    if chars.next().is_some() {
        return None;
    }
    let name = match c {
        'A'..='Z' => format!("Key{c}"),
        '0'..='9' => format!("Digit{c}"),
        _ => return None,
    };
    name.parse().ok()
}

/// The OS seam: actual registration calls go through this trait so the
/// manager's state machine can be exercised without a windowing system.
pub trait HotkeyBackend {
    fn register(&mut self, hotkey: HotKey) -> Result<(), String>;
    fn unregister(&mut self, hotkey: HotKey) -> Result<(), String>;
}

/// Backend over [`GlobalHotKeyManager`].
pub struct OsBackend {
    manager: GlobalHotKeyManager,
}

impl OsBackend {
    pub fn new() -> anyhow::Result<Self> {
        let manager = GlobalHotKeyManager::new()
            .map_err(|e| anyhow::anyhow!("failed to initialize global hotkey manager: {e}"))?;
        Ok(Self { manager })
    }
}

impl HotkeyBackend for OsBackend {
    fn register(&mut self, hotkey: HotKey) -> Result<(), String> {
        self.manager.register(hotkey).map_err(|e| e.to_string())
    }

    fn unregister(&mut self, hotkey: HotKey) -> Result<(), String> {
        self.manager.unregister(hotkey).map_err(|e| e.to_string())
    }
}

/// Owns the single registered binding and the hotkey-fired signal.
///
/// [`process_event`](Self::process_event) must be called for every hotkey
/// event the OS delivers; it is a pass-through filter that only claims
/// events matching the registered binding.
pub struct HotkeyManager<B: HotkeyBackend> {
    backend: B,
    registered: Option<Binding>,
    fired: mpsc::UnboundedSender<()>,
}

impl<B: HotkeyBackend> HotkeyManager<B> {
    /// Returns the manager and the receiving end of the hotkey-fired signal.
    pub fn new(backend: B) -> (Self, mpsc::UnboundedReceiver<()>) {
        let (fired, fired_rx) = mpsc::unbounded_channel();
        (
            Self {
                backend,
                registered: None,
                fired,
            },
            fired_rx,
        )
    }

    /// Register `binding_text` system-wide, replacing any current binding.
    ///
    /// Parsing happens before any OS call, so a malformed binding leaves the
    /// previous registration intact.
    pub fn register(&mut self, binding_text: &str) -> Result<(), HotkeyError> {
        let binding = Binding::parse(binding_text)?;

        self.unregister()?;
        self.backend
            .register(binding.hotkey())
            .map_err(HotkeyError::Denied)?;

        info!(binding = %binding.text(), "hotkey registered");
        self.registered = Some(binding);
        Ok(())
    }

    /// Release the OS-level binding. A no-op success when nothing is
    /// registered, so calling it twice is fine.
    pub fn unregister(&mut self) -> Result<(), HotkeyError> {
        let Some(binding) = self.registered.take() else {
            return Ok(());
        };
        self.backend
            .unregister(binding.hotkey())
            .map_err(HotkeyError::Denied)?;
        info!(binding = %binding.text(), "hotkey unregistered");
        Ok(())
    }

    pub fn is_registered(&self) -> bool {
        self.registered.is_some()
    }

    pub fn current(&self) -> Option<&Binding> {
        self.registered.as_ref()
    }

    /// Filter one OS hotkey event.
    ///
    /// Emits exactly one fired signal and returns `true` when the event is a
    /// press of the registered binding; otherwise returns `false` so the
    /// caller's normal dispatch continues. Only decodes and signals — no
    /// blocking work, safe to call on the event pump.
    pub fn process_event(&self, event: &GlobalHotKeyEvent) -> bool {
        let matches = self
            .registered
            .as_ref()
            .is_some_and(|b| b.hotkey().id() == event.id && event.state == HotKeyState::Pressed);
        if matches {
            debug!("hotkey fired");
            // Receiver dropped means the orchestrator is shutting down.
            let _ = self.fired.send(());
        }
        matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Debug, PartialEq, Eq)]
    enum Call {
        Register(u32),
        Unregister(u32),
    }

    #[derive(Default)]
    struct FakeBackend {
        calls: Vec<Call>,
        deny: bool,
    }

    impl HotkeyBackend for FakeBackend {
        fn register(&mut self, hotkey: HotKey) -> Result<(), String> {
            self.calls.push(Call::Register(hotkey.id()));
            if self.deny {
                Err("already registered by another process".to_string())
            } else {
                Ok(())
            }
        }

        fn unregister(&mut self, hotkey: HotKey) -> Result<(), String> {
            self.calls.push(Call::Unregister(hotkey.id()));
            Ok(())
        }
    }

    #[test]
    fn parse_is_order_independent_and_case_insensitive() {
        let expected = Modifiers::CONTROL | Modifiers::META | Modifiers::SUPER;
        for text in ["Ctrl+Win+J", "win+ctrl+j", "J+WIN+CONTROL", "ctrl + win + j"] {
            let binding = Binding::parse(text).unwrap();
            assert_eq!(binding.modifiers, expected, "binding {text:?}");
            assert_eq!(binding.trigger, Code::KeyJ, "binding {text:?}");
        }
    }

    #[test]
    fn parse_collects_all_modifiers() {
        let binding = Binding::parse("Ctrl+Alt+Shift+Windows+5").unwrap();
        assert_eq!(
            binding.modifiers,
            Modifiers::CONTROL
                | Modifiers::ALT
                | Modifiers::SHIFT
                | Modifiers::META
                | Modifiers::SUPER
        );
        assert_eq!(binding.trigger, Code::Digit5);
    }

    #[test]
    fn parse_allows_trigger_without_modifiers() {
        let binding = Binding::parse("K").unwrap();
        assert_eq!(binding.modifiers, Modifiers::empty());
        assert_eq!(binding.trigger, Code::KeyK);
    }

    #[test]
    fn parse_rejects_missing_trigger() {
        assert!(matches!(
            Binding::parse("Ctrl+Shift"),
            Err(HotkeyError::Parse { .. })
        ));
        assert!(matches!(Binding::parse(""), Err(HotkeyError::Parse { .. })));
    }

    #[test]
    fn parse_rejects_multiple_triggers() {
        assert!(matches!(
            Binding::parse("Ctrl+J+K"),
            Err(HotkeyError::Parse { .. })
        ));
    }

    #[test]
    fn parse_rejects_unknown_tokens() {
        assert!(matches!(
            Binding::parse("Ctrl+F5"),
            Err(HotkeyError::Parse { .. })
        ));
        assert!(matches!(
            Binding::parse("Hyper+J"),
            Err(HotkeyError::Parse { .. })
        ));
    }

    #[test]
    fn register_parse_failure_makes_no_os_call() {
        let (mut manager, _rx) = HotkeyManager::new(FakeBackend::default());
        assert!(manager.register("Ctrl+Shift").is_err());
        assert!(manager.backend.calls.is_empty());
        assert!(!manager.is_registered());
    }

    #[test]
    fn register_replaces_previous_binding() {
        let (mut manager, _rx) = HotkeyManager::new(FakeBackend::default());
        manager.register("Ctrl+Win+J").unwrap();
        manager.register("Alt+K").unwrap();

        let old = Binding::parse("Ctrl+Win+J").unwrap().hotkey().id();
        let new = Binding::parse("Alt+K").unwrap().hotkey().id();
        assert_eq!(
            manager.backend.calls,
            vec![Call::Register(old), Call::Unregister(old), Call::Register(new)]
        );
        assert_eq!(manager.current().unwrap().text(), "Alt+K");
    }

    #[test]
    fn register_reports_os_denial() {
        let (mut manager, _rx) = HotkeyManager::new(FakeBackend {
            deny: true,
            ..FakeBackend::default()
        });
        assert!(matches!(
            manager.register("Ctrl+Win+J"),
            Err(HotkeyError::Denied(_))
        ));
        assert!(!manager.is_registered());
    }

    #[test]
    fn unregister_twice_succeeds_with_one_os_call() {
        let (mut manager, _rx) = HotkeyManager::new(FakeBackend::default());
        manager.register("Ctrl+Win+J").unwrap();

        manager.unregister().unwrap();
        let calls_after_first = manager.backend.calls.len();
        manager.unregister().unwrap();
        assert_eq!(manager.backend.calls.len(), calls_after_first);
        assert!(!manager.is_registered());
    }

    #[test]
    fn process_event_claims_only_matching_presses() {
        let (mut manager, mut fired) = HotkeyManager::new(FakeBackend::default());
        manager.register("Ctrl+Win+J").unwrap();
        let id = manager.current().unwrap().hotkey().id();

        assert!(!manager.process_event(&GlobalHotKeyEvent {
            id: id.wrapping_add(1),
            state: HotKeyState::Pressed,
        }));
        assert!(!manager.process_event(&GlobalHotKeyEvent {
            id,
            state: HotKeyState::Released,
        }));
        assert!(manager.process_event(&GlobalHotKeyEvent {
            id,
            state: HotKeyState::Pressed,
        }));

        // Exactly one signal for the one matching press.
        assert!(fired.try_recv().is_ok());
        assert!(fired.try_recv().is_err());
    }

    #[test]
    fn process_event_without_registration_claims_nothing() {
        let (manager, mut fired) = HotkeyManager::new(FakeBackend::default());
        assert!(!manager.process_event(&GlobalHotKeyEvent {
            id: 7,
            state: HotKeyState::Pressed,
        }));
        assert!(fired.try_recv().is_err());
    }
}
