pub mod boards;
pub mod buckets;
pub mod cards;
pub mod cli;
pub mod config;
pub mod display;
pub mod engine;
pub mod error;
pub mod game;
pub mod game_tree;
pub mod hand_evaluator;
pub mod holdings;
pub mod regret_matching;
pub mod solver;
pub mod stored_value;
pub mod strategy;
pub mod street_values;
pub mod terminal;
pub mod tree_builder;
pub mod value_store;
pub mod worker_pool;
