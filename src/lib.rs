//! Aisha Backend
//!
//! A small HTTP backend that runs a product waiting list, relays prompts to
//! Google Gemini and sends and receives WhatsApp messages through the Ngumzo
//! gateway.
//!
//! # Architecture
//!
//! ## Core Components
//!
//! * `api` - HTTP routes, request/response shapes and shared state (Axum)
//! * `queue` - Waiting list entries, positions and status transitions
//! * `phone` - Phone number normalization to `+<country code><subscriber>`
//! * `whatsapp` - Outbound messaging through Ngumzo and message history
//! * `webhook` - Webhook verification, signatures and inbound payload parsing
//! * `gemini` - Prompt relay to the Gemini `generateContent` API
//! * `store` - Redis persistence for entries and message history
//! * `upstream` - Classification of outbound provider failures
//! * `config` - Environment configuration
//! * `error` - Error handling and HTTP response mapping
//!
//! ## Design
//!
//! ### API Layer (`api.rs`)
//! - Built with Axum, CORS open to any origin
//! - Handlers are thin: they extract, call one service and shape the reply
//! - Request bodies accept camelCase and snake_case field names
//!
//! ### Storage Layer (`store.rs`)
//! - Redis for entries and message history
//! - Enqueue runs as a single Lua script so positions never collide
//!
//! ### Providers (`gemini.rs`, `whatsapp.rs`)
//! - Each provider sits behind a trait so tests substitute doubles
//! - Calls are bounded by a timeout and never retried
//!
//! # Environment Configuration
//!
//! ```bash
//! REDIS_URL=redis://localhost:6379       # Redis connection URL
//! REDIS_KEY_PREFIX=aisha                 # Namespace for every key
//! GEMINI_API_KEY=your-key-here           # Gemini API key (required)
//! GEMINI_MODEL=gemini-2.5-flash          # Gemini model
//! NGUMZO_API_KEY=your-key-here           # Ngumzo API key (required)
//! NGUMZO_SENDER_ID=AISHA                 # Ngumzo sender id (required)
//! WHATSAPP_VERIFY_TOKEN=token            # Webhook subscription token
//! WHATSAPP_APP_SECRET=secret             # Webhook signing secret
//! UPSTREAM_TIMEOUT_SECS=30               # Provider call timeout
//! PHONE_COUNTRY_CODE=254                 # Country code for local numbers
//! WAITLIST_CONFIRMATION=true             # WhatsApp new entries
//! HOST=127.0.0.1                         # Server host
//! PORT=3000                              # Server port
//! RUST_LOG=info                          # Logging level
//! ```
//!
//! # API Endpoints
//!
//! ## POST /waiting-list/
//! Adds a person to the waiting list.
//!
//! ### Request
//! ```json
//! {
//!   "displayName": "John Doe",
//!   "phoneNumber": "0712345678"
//! }
//! ```
//!
//! ### Response (201)
//! ```json
//! {
//!   "id": "uuid",
//!   "displayName": "John Doe",
//!   "phoneNumber": "+254712345678",
//!   "position": 1,
//!   "createdAt": "2024-01-01T00:00:00Z",
//!   "status": "active",
//!   "whatsappSent": true
//! }
//! ```
//!
//! ## GET /waiting-list/:id
//! Current position and status of an entry. `position` is `null` once the
//! entry is no longer active.
//!
//! ## POST /gemini
//! ```json
//! { "prompt": "string" }
//! ```
//! Responds with `{ "response": "string", "tokensUsed": 42 }`.
//!
//! ## POST /whatsapp/send-text, /whatsapp/send-media, /whatsapp/send-template
//! Send a message; the reply carries the provider receipt under `data`.
//!
//! ## GET /whatsapp/messages/:phone_number
//! Message history for a number, newest first.
//!
//! ## GET, POST /webhook/whatsapp
//! Subscription verification and inbound events. Events are always
//! acknowledged with `{ "received": true }`.
//!
//! # Errors
//!
//! Failures are returned as `{ "success": false, "error": "...", "details": "..." }`
//! with a status taken from [`error::AppError::status`].

pub mod api;
pub mod config;
pub mod error;
pub mod gemini;
pub mod phone;
pub mod queue;
pub mod store;
pub mod testing;
pub mod upstream;
pub mod webhook;
pub mod whatsapp;
