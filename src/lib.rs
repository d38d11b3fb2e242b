pub mod alpha_model;
pub mod alpha_signals;
pub mod backtest;
pub mod calibration;
pub mod config;
pub mod decision;
pub mod feeds;
pub mod gmm;
pub mod league;
pub mod lineup;
pub mod monte_carlo;
pub mod opponent_strength;
pub mod player_model;
pub mod ros_value;
pub mod snapshot;

pub use config::Config;
pub use league::{LeagueContext, Player, Position, Team};
