//! Team-week feature builders. Each produces a shifted `StatTable` and a per-game
//! differential column aligned with the game rows it was joined onto.

pub mod play_stats;
pub mod pythag;
pub mod qb_rating;
