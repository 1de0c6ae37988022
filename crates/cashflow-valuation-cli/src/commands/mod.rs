pub mod batch;
pub mod monte_carlo;
pub mod npv;
pub mod real_options;
