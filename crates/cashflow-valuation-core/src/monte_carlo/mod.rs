pub mod price_paths;
pub mod simulation;
