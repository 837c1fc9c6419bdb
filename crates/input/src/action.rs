use crate::Key;

/// A discrete, edge-triggered action bound to a key.
///
/// Continuous movement is read from [`crate::InputState`] every frame;
/// actions fire once per key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Pause or resume the spin of every object.
    ToggleRotation,
    /// Advance every material to the next filtering tier.
    ToggleFiltering,
    Quit,
}

impl Action {
    pub fn from_key(key: Key) -> Option<Self> {
        match key {
            Key::F2 => Some(Self::ToggleRotation),
            Key::F3 => Some(Self::ToggleFiltering),
            Key::Escape => Some(Self::Quit),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn function_keys_map_to_toggles() {
        assert_eq!(Action::from_key(Key::F2), Some(Action::ToggleRotation));
        assert_eq!(Action::from_key(Key::F3), Some(Action::ToggleFiltering));
        assert_eq!(Action::from_key(Key::Escape), Some(Action::Quit));
    }

    #[test]
    fn movement_keys_are_not_actions() {
        for key in [Key::W, Key::A, Key::S, Key::D, Key::Q, Key::E] {
            assert_eq!(Action::from_key(key), None);
        }
    }
}
