//! Poem of the day: date -> theme -> generated poem, stored once per date.

pub mod cache;
pub mod generator;
pub mod themes;

pub use cache::{DailyOutcome, DailyPoemCache};
pub use generator::{GeneratedPoem, GenerationError, OpenRouterConfig, OpenRouterGenerator, PoemGenerator};
pub use themes::{ThemeCalendar, parse_day};
