//! macOS system colors, from the Apple human interface guidelines.
//!
//! https://developer.apple.com/design/human-interface-guidelines/color#macOS-system-colors

#[derive(Debug, Clone, Copy)]
pub struct Color {
    pub default_light: (u8, u8, u8),
    pub default_dark: (u8, u8, u8),
}

pub static RED: Color = Color {
    default_light: (255, 59, 48),
    default_dark: (255, 69, 58),
};

pub static YELLOW: Color = Color {
    default_light: (255, 204, 0),
    default_dark: (255, 214, 10),
};

pub static GREEN: Color = Color {
    default_light: (40, 205, 65),
    default_dark: (50, 215, 75),
};

pub static GRAY: Color = Color {
    default_light: (142, 142, 147),
    default_dark: (152, 152, 157),
};
