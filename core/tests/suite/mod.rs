// Aggregates all former standalone integration tests as modules.
mod chat_panel;
mod followup;
