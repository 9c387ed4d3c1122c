//! Scheduled Firebase pollers that forward new records as FCM push
//! notifications.
//!
//! Two independent batch jobs share one shape: load a cursor, query a change
//! source, filter, render, deliver, commit the cursor. The cards job tracks a
//! timestamp checkpoint stored in the Realtime Database next to the data; the
//! payments job tracks a locally persisted set of already-notified
//! (session, status) keys.

pub mod auth;
pub mod cards;
pub mod config;
pub mod fcm;
pub mod firestore;
pub mod model;
pub mod payments;
pub mod render;
pub mod rtdb;
pub mod store;
