// src/trading/mod.rs
pub mod bot;
pub mod classifier;
pub mod execution;
pub mod portfolio;
pub mod risk;
pub mod signals;

pub use bot::{CycleOutcome, LoopPhase, TradingLoop};
pub use classifier::{DecisionTreeClassifier, ForestConfig, LabelClassifier, RandomForestClassifier};
pub use execution::{ExecutionEngine, ExecutionOutcome};
pub use portfolio::PortfolioTracker;
pub use risk::{Admission, ExitReason, RiskGate};
pub use signals::{Decision, SignalGenerator};
