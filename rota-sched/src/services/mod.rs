//! Core services: conflict analysis, auto-assignment, kiosk, attendance, live view

pub mod attendance;
pub mod conflict_analyzer;
pub mod fairness;
pub mod kiosk;
pub mod kiosk_engine;
pub mod kiosk_terminal;
pub mod live_view;
pub mod orchestrator;
pub mod solver_client;
pub mod solver_messages;

pub use attendance::Attendance;
pub use conflict_analyzer::{analyze, ConflictReport};
pub use kiosk_engine::KioskEngine;
pub use kiosk_terminal::KioskTerminal;
pub use live_view::LiveView;
pub use orchestrator::Orchestrator;
pub use solver_client::SolverClient;
