///! Pattern resolution: (solved, transmitting) -> what a satellite's LEDs show
use smart_leds::RGB8;
use std::time::Duration;

/// Colors for the three satellite states, already scaled by brightness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub unsolved: RGB8,
    pub solved: RGB8,
    pub transmitting: RGB8,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            unsolved: RGB8::new(255, 0, 0),
            solved: RGB8::new(0, 255, 0),
            transmitting: RGB8::new(0, 0, 255),
        }
    }
}

/// Scale a color by a 0-255 brightness.
pub fn scale(color: RGB8, brightness: u8) -> RGB8 {
    let channel = |c: u8| ((c as u16 * brightness as u16) / 255) as u8;
    RGB8::new(channel(color.r), channel(color.g), channel(color.b))
}

/// Render instruction for one satellite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    Solid(RGB8),
    /// `first` for one half-period, then `second` for the next.
    Alternating {
        first: RGB8,
        second: RGB8,
        half_period: Duration,
    },
}

impl Pattern {
    /// Color to show at `phase`, measured from a reference shared by every satellite.
    pub fn color_at(&self, phase: Duration) -> RGB8 {
        match *self {
            Pattern::Solid(color) => color,
            Pattern::Alternating {
                first,
                second,
                half_period,
            } => {
                let half = half_period.as_nanos();
                if half == 0 {
                    return first;
                }
                if phase.as_nanos() % (half * 2) < half {
                    first
                } else {
                    second
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternResolver {
    palette: Palette,
    half_period: Duration,
}

impl PatternResolver {
    pub fn new(palette: Palette, half_period: Duration) -> Self {
        Self {
            palette,
            half_period,
        }
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    /// Total over all four combinations; no side effects.
    pub fn resolve(&self, solved: bool, transmitting: bool) -> Pattern {
        let base = if solved {
            self.palette.solved
        } else {
            self.palette.unsolved
        };

        if transmitting {
            Pattern::Alternating {
                first: base,
                second: self.palette.transmitting,
                half_period: self.half_period,
            }
        } else {
            Pattern::Solid(base)
        }
    }
}

impl Default for PatternResolver {
    fn default() -> Self {
        Self::new(Palette::default(), Duration::from_millis(500))
    }
}
