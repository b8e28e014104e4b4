use std::fmt;

pub const WIDTH: usize = 32;
pub const HEIGHT: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const WHITE: Rgb = Rgb(0xff, 0xff, 0xff);

    /// Parses `#rrggbb` (the leading `#` is optional).
    #[allow(dead_code)]
    pub fn from_hex(hex: &str) -> Option<Rgb> {
        let hex = hex.strip_prefix('#').unwrap_or(hex);
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let channel = |idx: usize| u8::from_str_radix(&hex[idx..idx + 2], 16).ok();
        Some(Rgb(channel(0)?, channel(2)?, channel(4)?))
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.0, self.1, self.2)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Position {
        Position { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextStyle {
    pub color: Rgb,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextItem {
    pub style: TextStyle,
    pub text: String,
    pub position: Position,
}

/// Contents of the LED matrix between two `clear` calls.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Frame {
    // Indexed as pixels[x][y]
    pub pixels: [[Option<Rgb>; HEIGHT]; WIDTH],
    pub texts: Vec<TextItem>,
}

impl Default for Frame {
    fn default() -> Frame {
        Frame {
            pixels: [[None; HEIGHT]; WIDTH],
            texts: Vec::new(),
        }
    }
}

impl Frame {
    pub const PROGRESS_COLOR: Rgb = Rgb(0x30, 0x30, 0xa0);

    pub fn clear(&mut self) {
        *self = Frame::default();
    }

    pub fn draw_text(&mut self, style: TextStyle, text: &str, position: Position) {
        self.texts.push(TextItem {
            style,
            text: text.to_owned(),
            position,
        });
    }

    /// Lights the bottom row proportionally to `value / max`.
    pub fn draw_pixel_progress(&mut self, value: u32, max: u32) {
        let lit = if max == 0 {
            0
        } else {
            (value.min(max) as usize * WIDTH) / max as usize
        };
        for column in self.pixels.iter_mut().take(lit) {
            column[HEIGHT - 1] = Some(Self::PROGRESS_COLOR);
        }
    }

    #[allow(dead_code)]
    pub fn lit_pixels(&self) -> usize {
        self.pixels.iter().flatten().filter(|px| px.is_some()).count()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Top row cover
        write!(f, ".")?;
        for _ in 0..WIDTH {
            write!(f, "-")?;
        }
        writeln!(f, ".")?;

        // Pixel rows
        for y in 0..HEIGHT {
            write!(f, "|")?;
            for x in 0..WIDTH {
                if self.pixels[x][y].is_some() {
                    write!(f, "█")?;
                } else {
                    write!(f, " ")?;
                }
            }
            writeln!(f, "|")?;
        }

        // Bottom row cover
        write!(f, ".")?;
        for _ in 0..WIDTH {
            write!(f, "-")?;
        }
        write!(f, ".")?;

        for item in &self.texts {
            write!(
                f,
                "\n{} \"{}\" at ({}, {})",
                item.style.color, item.text, item.position.x, item.position.y
            )?;
        }

        Ok(())
    }
}
