// Core layer - shared types and configuration
pub mod core;

// Features layer - all feature modules
pub mod features;

// IPC layer - communication between the host application and the service
pub mod ipc;

// Infrastructure
pub mod database;

// Application layer
pub mod service;

// Re-export core config
pub use core::Config;

// Re-export feature items
pub use features::{
    // History
    HistoryCache, PurchaseHistoryApi, PurchaseHistoryEntry,
    // Hooks
    DocumentEvent, HookDispatcher, HookOutcome,
    // Notifications
    Mailer, OutboxMailer,
    // Reminders
    DeliveryReminder, Job, ReminderManager, ReminderScheduler,
    // Settings
    Settings, SettingsStore,
};

pub use database::Database;
pub use service::ReminderService;

// Re-export IPC items
pub use ipc::{HostRequest, IpcClient, IpcServer, ServiceEvent};
