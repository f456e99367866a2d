// src/models/mod.rs
pub mod media_item;
pub mod retro_games;
