//! Handler table, one slot per [`EventKind`].

use super::event::{EventKind, InputEvent, Subscription};
use super::InputControl;

/// Callback invoked synchronously from [`EventSource::pump`](super::EventSource::pump).
///
/// Whatever state the caller needs is captured by the closure.
pub type Handler = Box<dyn FnMut(&InputEvent, &mut InputControl<'_>) + Send>;

/// Fixed-size handler table; registering replaces the previous handler.
pub struct HandlerRegistry {
    slots: [Option<Handler>; EventKind::COUNT],
}

impl HandlerRegistry {
    /// Empty table.
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
        }
    }

    /// Install or clear the handler for `kind`, returning the previous one.
    pub fn set(&mut self, kind: EventKind, handler: Option<Handler>) -> Option<Handler> {
        std::mem::replace(&mut self.slots[kind.index()], handler)
    }

    /// Whether `kind` has a handler.
    pub fn contains(&self, kind: EventKind) -> bool {
        self.slots[kind.index()].is_some()
    }

    /// Subscriptions needed by the installed handlers.
    pub fn subscriptions(&self) -> Subscription {
        EventKind::ALL
            .iter()
            .filter(|kind| self.contains(**kind))
            .fold(Subscription::empty(), |acc, kind| acc | kind.subscription())
    }

    /// Run the handler for `event`, if any. Returns whether one ran.
    pub fn dispatch(&mut self, event: &InputEvent, control: &mut InputControl<'_>) -> bool {
        match &mut self.slots[event.kind().index()] {
            Some(handler) => {
                handler(event, control);
                true
            }
            None => false,
        }
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("subscriptions", &self.subscriptions())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Handler {
        Box::new(|_, _| {})
    }

    #[test]
    fn test_subscriptions_follow_handlers() {
        let mut registry = HandlerRegistry::new();
        assert!(registry.subscriptions().is_empty());

        registry.set(EventKind::MousePress, Some(noop()));
        registry.set(EventKind::KeyDown, Some(noop()));
        assert_eq!(
            registry.subscriptions(),
            Subscription::MOUSE_TRACKING | Subscription::KEY_PRESS
        );

        // Release still keeps tracking alive after press is cleared.
        registry.set(EventKind::MouseRelease, Some(noop()));
        registry.set(EventKind::MousePress, None);
        assert!(registry.subscriptions().contains(Subscription::MOUSE_TRACKING));
    }

    #[test]
    fn test_set_returns_previous() {
        let mut registry = HandlerRegistry::new();
        assert!(registry.set(EventKind::WindowEnter, Some(noop())).is_none());
        assert!(registry.set(EventKind::WindowEnter, None).is_some());
        assert!(!registry.contains(EventKind::WindowEnter));
    }
}
