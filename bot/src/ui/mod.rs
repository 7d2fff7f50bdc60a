pub mod embeds;

pub use embeds::{render_status, Decorations};
