pub mod black_scholes;
pub mod decision;
