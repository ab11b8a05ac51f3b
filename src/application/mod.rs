pub mod ai_scheduler;
pub mod alerts;
pub mod bootstrap;
pub mod commands;
pub mod hourly_timer;
pub mod phase_timer;
pub mod pomodoro_timer;
pub mod prompts;
