pub mod estimate;
pub mod evaluate;
pub mod frontier;
pub mod presets;
