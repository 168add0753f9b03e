use minifb::Key;

/// Host side of the keypad. The emulator only ever asks about the sixteen
/// keys in [`KEYMAP`].
pub trait KeySource {
    /// Key is currently held down.
    fn is_down(&self, key: Key) -> bool;
    /// Key went down since the previous frame.
    fn just_pressed(&self, key: Key) -> bool;
}

/// Virtual keypad layout on the left of a QWERTY keyboard:
///
/// ```text
/// 1 2 3 C    1 2 3 4
/// 4 5 6 D    Q W E R
/// 7 8 9 E    A S D F
/// A 0 B F    Z X C V
/// ```
///
/// Table order is also the priority order when several keys go down at once.
pub const KEYMAP: [(u8, Key); 16] = [
    (0x1, Key::Key1),
    (0x2, Key::Key2),
    (0x3, Key::Key3),
    (0xC, Key::Key4),
    (0x4, Key::Q),
    (0x5, Key::W),
    (0x6, Key::E),
    (0xD, Key::R),
    (0x7, Key::A),
    (0x8, Key::S),
    (0x9, Key::D),
    (0xE, Key::F),
    (0xA, Key::Z),
    (0x0, Key::X),
    (0xB, Key::C),
    (0xF, Key::V),
];

pub fn host_key(vkey: u8) -> Option<Key> {
    KEYMAP
        .iter()
        .find(|(v, _)| *v == vkey)
        .map(|(_, key)| *key)
}

pub fn key_to_num(key: Key) -> Option<u8> {
    KEYMAP
        .iter()
        .find(|(_, k)| *k == key)
        .map(|(vkey, _)| *vkey)
}

pub fn is_held(keys: &dyn KeySource, vkey: u8) -> bool {
    host_key(vkey).is_some_and(|key| keys.is_down(key))
}

pub fn poll_pressed(keys: &dyn KeySource) -> Option<u8> {
    KEYMAP
        .iter()
        .find(|(_, key)| keys.just_pressed(*key))
        .map(|(vkey, _)| *vkey)
}
