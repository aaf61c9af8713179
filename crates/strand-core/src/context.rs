//! Request context, sessions, and snapshots.
//!
//! The transport that carried the original upgrade request is free to
//! recycle or mutate its request object once the handshake completes.
//! Everything downstream of the upgrade therefore works from a
//! [`ContextSnapshot`]: an independently-owned copy of the request state,
//! captured at a declared [`SnapshotTiming`].
//!
//! Two snapshots exist per upgrade. The pre-upgrade snapshot feeds the
//! handshake decision; the post-upgrade snapshot, captured the moment the
//! channel opens, is the authoritative context for all protocol dispatch.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::SnapshotError;

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

/// A session handle shared between the original exchange and its snapshots.
///
/// This is the one piece of request-adjacent state that outlives transport
/// recycling, so degraded snapshots can still carry it. Attribute access is
/// internally locked; clone the `Arc`, not the session.
#[derive(Debug)]
pub struct Session {
    id: String,
    attributes: RwLock<HashMap<String, Value>>,
}

impl Session {
    /// Create a session with a fresh v7 UUID.
    #[must_use]
    pub fn new() -> Self {
        Self::with_id(Uuid::now_v7().to_string())
    }

    /// Create a session with a caller-chosen id.
    #[must_use]
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: RwLock::new(HashMap::new()),
        }
    }

    /// The session id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Look up an attribute.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.attributes.read().get(key).cloned()
    }

    /// Set an attribute, returning the previous value if any.
    pub fn insert(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.attributes.write().insert(key.into(), value)
    }

    /// Remove an attribute.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.attributes.write().remove(key)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// RequestContext
// ─────────────────────────────────────────────────────────────────────────────

/// Owned copy of one inbound request, as the bridge sees it.
///
/// `destroy()` models the transport reclaiming its request object: headers,
/// query, and any buffered body are dropped. Snapshots captured beforehand
/// are unaffected.
#[derive(Debug)]
pub struct RequestContext {
    method: String,
    path: String,
    query: Mutex<Option<String>>,
    /// Header names stored lowercased for case-insensitive lookup.
    headers: Mutex<Vec<(String, String)>>,
    body: Mutex<Option<Bytes>>,
    session: Mutex<Option<Arc<Session>>>,
    destroyed: AtomicBool,
}

impl RequestContext {
    /// Create a request context for the given method and path.
    #[must_use]
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            query: Mutex::new(None),
            headers: Mutex::new(Vec::new()),
            body: Mutex::new(None),
            session: Mutex::new(None),
            destroyed: AtomicBool::new(false),
        }
    }

    /// Set the query string.
    #[must_use]
    pub fn with_query(self, query: impl Into<String>) -> Self {
        *self.query.lock() = Some(query.into());
        self
    }

    /// Append a header.
    #[must_use]
    pub fn with_header(self, name: &str, value: impl Into<String>) -> Self {
        self.headers
            .lock()
            .push((name.to_ascii_lowercase(), value.into()));
        self
    }

    /// Set the buffered request body.
    #[must_use]
    pub fn with_body(self, body: impl Into<Bytes>) -> Self {
        *self.body.lock() = Some(body.into());
        self
    }

    /// Attach an existing session.
    #[must_use]
    pub fn with_session(self, session: Arc<Session>) -> Self {
        *self.session.lock() = Some(session);
        self
    }

    /// The request method.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The request path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The query string, if any.
    #[must_use]
    pub fn query(&self) -> Option<String> {
        self.query.lock().clone()
    }

    /// First value of a header, case-insensitive.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<String> {
        let name = name.to_ascii_lowercase();
        self.headers
            .lock()
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.clone())
    }

    /// All values of a header, case-insensitive.
    #[must_use]
    pub fn header_all(&self, name: &str) -> Vec<String> {
        let name = name.to_ascii_lowercase();
        self.headers
            .lock()
            .iter()
            .filter(|(n, _)| *n == name)
            .map(|(_, v)| v.clone())
            .collect()
    }

    /// Snapshot of all headers as (lowercased-name, value) pairs.
    #[must_use]
    pub fn headers(&self) -> Vec<(String, String)> {
        self.headers.lock().clone()
    }

    /// The buffered body, if any. Cheap: `Bytes` clones share the buffer.
    #[must_use]
    pub fn body(&self) -> Option<Bytes> {
        self.body.lock().clone()
    }

    /// The attached session, if any.
    #[must_use]
    pub fn session(&self) -> Option<Arc<Session>> {
        self.session.lock().clone()
    }

    /// Return the session, creating and attaching one if absent.
    #[must_use]
    pub fn ensure_session(&self) -> Arc<Session> {
        let mut guard = self.session.lock();
        if let Some(session) = guard.as_ref() {
            return Arc::clone(session);
        }
        let session = Arc::new(Session::new());
        *guard = Some(Arc::clone(&session));
        session
    }

    /// Whether `destroy()` has run.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Model the transport reclaiming this request object.
    ///
    /// Headers, query, and body are dropped; the session handle survives
    /// because it is owned jointly with the session layer. Idempotent.
    pub fn destroy(&self) {
        self.destroyed.store(true, Ordering::Release);
        self.headers.lock().clear();
        *self.query.lock() = None;
        *self.body.lock() = None;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Snapshots
// ─────────────────────────────────────────────────────────────────────────────

/// When a snapshot was captured relative to the upgrade.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SnapshotTiming {
    /// Before the transport finalizes the upgrade. Used only for the
    /// handshake decision; the original object is still valid here.
    PreUpgrade,
    /// At the moment the channel opens. Authoritative for all subsequent
    /// protocol dispatch.
    PostUpgrade,
}

/// Options controlling one snapshot capture.
#[derive(Clone, Copy, Debug)]
pub struct SnapshotOptions {
    /// When this capture happens.
    pub timing: SnapshotTiming,
    /// Buffer the pending body into the snapshot. Required at post-upgrade
    /// time: transports that recycle request objects as part of completing
    /// the upgrade would otherwise lose body data.
    pub materialize_body: bool,
    /// Produce a degraded snapshot (session data only) when the original
    /// is unavailable, instead of failing the capture.
    pub allow_degraded: bool,
    /// Create a session when the original carries none.
    pub create_session: bool,
}

impl SnapshotOptions {
    /// Options for the handshake-decision snapshot.
    #[must_use]
    pub fn pre_upgrade() -> Self {
        Self {
            timing: SnapshotTiming::PreUpgrade,
            materialize_body: false,
            allow_degraded: false,
            create_session: true,
        }
    }

    /// Options for the authoritative channel-open snapshot.
    #[must_use]
    pub fn post_upgrade() -> Self {
        Self {
            timing: SnapshotTiming::PostUpgrade,
            materialize_body: true,
            allow_degraded: true,
            create_session: true,
        }
    }

    /// Disable session creation.
    #[must_use]
    pub fn without_session_creation(mut self) -> Self {
        self.create_session = false;
        self
    }
}

/// An independently-owned copy of request state.
///
/// Once captured, a snapshot never aliases mutable state of the original
/// transport object: all fields are owned copies (body bytes share an
/// immutable buffer with the original, which cannot observe or cause
/// mutation).
#[derive(Clone, Debug)]
pub struct ContextSnapshot {
    timing: SnapshotTiming,
    degraded: bool,
    method: Option<String>,
    path: Option<String>,
    query: Option<String>,
    headers: Vec<(String, String)>,
    body: Option<Bytes>,
    session: Option<Arc<Session>>,
    captured_at: DateTime<Utc>,
}

impl ContextSnapshot {
    /// Capture a snapshot of `original`.
    ///
    /// Pass `None` (or an already-destroyed context) to represent an
    /// original the transport could not recover; with
    /// `options.allow_degraded` this yields a degraded snapshot carrying
    /// only session-reachable data, otherwise the capture fails.
    pub fn capture(
        original: Option<&RequestContext>,
        options: SnapshotOptions,
    ) -> Result<Self, SnapshotError> {
        match original {
            Some(ctx) if !ctx.is_destroyed() => Ok(Self::full(ctx, options)),
            unavailable => {
                if !options.allow_degraded {
                    return Err(SnapshotError::OriginalUnavailable);
                }
                tracing::warn!(
                    timing = ?options.timing,
                    "original request unavailable, capturing degraded snapshot"
                );
                Ok(Self::degraded(unavailable, options))
            }
        }
    }

    fn full(ctx: &RequestContext, options: SnapshotOptions) -> Self {
        let session = if options.create_session {
            Some(ctx.ensure_session())
        } else {
            ctx.session()
        };
        Self {
            timing: options.timing,
            degraded: false,
            method: Some(ctx.method().to_owned()),
            path: Some(ctx.path().to_owned()),
            query: ctx.query(),
            headers: ctx.headers(),
            body: if options.materialize_body {
                ctx.body()
            } else {
                None
            },
            session,
            captured_at: Utc::now(),
        }
    }

    fn degraded(unavailable: Option<&RequestContext>, options: SnapshotOptions) -> Self {
        // Only the session handle is reachable once the transport has
        // reclaimed the request object.
        let existing = unavailable.and_then(RequestContext::session);
        let session = match existing {
            Some(session) => Some(session),
            None if options.create_session => Some(Arc::new(Session::new())),
            None => None,
        };
        Self {
            timing: options.timing,
            degraded: true,
            method: None,
            path: None,
            query: None,
            headers: Vec::new(),
            body: None,
            session,
            captured_at: Utc::now(),
        }
    }

    /// When this snapshot was captured relative to the upgrade.
    #[must_use]
    pub fn timing(&self) -> SnapshotTiming {
        self.timing
    }

    /// Whether this snapshot was produced by the degraded fallback.
    ///
    /// Degraded snapshots carry only session-reachable data; higher layers
    /// use this flag to detect impoverished context.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// The request method, if the original was reachable.
    #[must_use]
    pub fn method(&self) -> Option<&str> {
        self.method.as_deref()
    }

    /// The request path, if the original was reachable.
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// The query string, if any.
    #[must_use]
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// First value of a header, case-insensitive.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }

    /// All captured headers as (lowercased-name, value) pairs.
    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// The materialized body, if capture requested one.
    #[must_use]
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// The session handle.
    #[must_use]
    pub fn session(&self) -> Option<&Arc<Session>> {
        self.session.as_ref()
    }

    /// Capture timestamp.
    #[must_use]
    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Release snapshot-held resources eagerly.
    ///
    /// Called by the event adapter after close dispatch; dropping the
    /// snapshot would release them anyway, but shared clones may outlive
    /// the adapter.
    pub fn release(&mut self) {
        self.headers.clear();
        self.body = None;
        self.session = None;
        self.query = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_request() -> RequestContext {
        RequestContext::new("GET", "/chat")
            .with_query("room=lobby")
            .with_header("Host", "example.test")
            .with_header("Sec-WebSocket-Protocol", "chat.v2")
            .with_body(&b"hello body"[..])
    }

    // ── Session ──────────────────────────────────────────────────────────

    #[test]
    fn session_ids_are_unique() {
        assert_ne!(Session::new().id(), Session::new().id());
    }

    #[test]
    fn session_attributes_roundtrip() {
        let session = Session::with_id("s1");
        assert!(session.insert("user", json!("alice")).is_none());
        assert_eq!(session.get("user"), Some(json!("alice")));
        assert_eq!(session.remove("user"), Some(json!("alice")));
        assert!(session.get("user").is_none());
    }

    // ── RequestContext ───────────────────────────────────────────────────

    #[test]
    fn header_lookup_is_case_insensitive() {
        let ctx = sample_request();
        assert_eq!(ctx.header("host").as_deref(), Some("example.test"));
        assert_eq!(ctx.header("HOST").as_deref(), Some("example.test"));
        assert_eq!(
            ctx.header("sec-websocket-protocol").as_deref(),
            Some("chat.v2")
        );
    }

    #[test]
    fn header_all_collects_repeats() {
        let ctx = RequestContext::new("GET", "/")
            .with_header("Accept", "a")
            .with_header("accept", "b");
        assert_eq!(ctx.header_all("ACCEPT"), vec!["a", "b"]);
    }

    #[test]
    fn ensure_session_creates_once() {
        let ctx = RequestContext::new("GET", "/");
        let first = ctx.ensure_session();
        let second = ctx.ensure_session();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn destroy_clears_request_state() {
        let ctx = sample_request();
        let session = ctx.ensure_session();
        ctx.destroy();
        assert!(ctx.is_destroyed());
        assert!(ctx.header("host").is_none());
        assert!(ctx.query().is_none());
        assert!(ctx.body().is_none());
        // The session handle survives recycling.
        assert!(Arc::ptr_eq(&ctx.session().unwrap(), &session));
    }

    // ── ContextSnapshot ──────────────────────────────────────────────────

    #[test]
    fn full_capture_copies_request_state() {
        let ctx = sample_request();
        let snap =
            ContextSnapshot::capture(Some(&ctx), SnapshotOptions::post_upgrade()).unwrap();
        assert!(!snap.is_degraded());
        assert_eq!(snap.timing(), SnapshotTiming::PostUpgrade);
        assert_eq!(snap.method(), Some("GET"));
        assert_eq!(snap.path(), Some("/chat"));
        assert_eq!(snap.query(), Some("room=lobby"));
        assert_eq!(snap.header("Host"), Some("example.test"));
        assert_eq!(snap.body().unwrap().as_ref(), b"hello body");
    }

    #[test]
    fn pre_upgrade_capture_skips_body() {
        let ctx = sample_request();
        let snap =
            ContextSnapshot::capture(Some(&ctx), SnapshotOptions::pre_upgrade()).unwrap();
        assert!(snap.body().is_none());
        assert_eq!(snap.timing(), SnapshotTiming::PreUpgrade);
    }

    #[test]
    fn snapshot_survives_original_destroy() {
        let ctx = sample_request();
        let snap =
            ContextSnapshot::capture(Some(&ctx), SnapshotOptions::post_upgrade()).unwrap();
        let before = snap.body().unwrap().clone();

        ctx.destroy();

        // Identical bytes after the original was recycled.
        assert_eq!(snap.body().unwrap(), &before);
        assert_eq!(snap.header("host"), Some("example.test"));
        assert_eq!(snap.path(), Some("/chat"));
    }

    #[test]
    fn degraded_capture_keeps_session_only() {
        let ctx = sample_request();
        let session = ctx.ensure_session();
        ctx.destroy();

        let snap =
            ContextSnapshot::capture(Some(&ctx), SnapshotOptions::post_upgrade()).unwrap();
        assert!(snap.is_degraded());
        assert!(snap.method().is_none());
        assert!(snap.path().is_none());
        assert!(snap.headers().is_empty());
        assert!(snap.body().is_none());
        assert!(Arc::ptr_eq(snap.session().unwrap(), &session));
    }

    #[test]
    fn degraded_capture_from_missing_original() {
        let snap = ContextSnapshot::capture(None, SnapshotOptions::post_upgrade()).unwrap();
        assert!(snap.is_degraded());
        // create_session default still applies on the degraded path.
        assert!(snap.session().is_some());
    }

    #[test]
    fn unavailable_original_without_degraded_fails() {
        let err = ContextSnapshot::capture(None, SnapshotOptions::pre_upgrade()).unwrap_err();
        assert!(matches!(err, SnapshotError::OriginalUnavailable));
    }

    #[test]
    fn create_session_installs_on_original() {
        let ctx = RequestContext::new("GET", "/");
        let snap =
            ContextSnapshot::capture(Some(&ctx), SnapshotOptions::post_upgrade()).unwrap();
        // The same session is now visible to later captures of the same
        // original.
        let again =
            ContextSnapshot::capture(Some(&ctx), SnapshotOptions::post_upgrade()).unwrap();
        assert!(Arc::ptr_eq(
            snap.session().unwrap(),
            again.session().unwrap()
        ));
    }

    #[test]
    fn session_creation_can_be_disabled() {
        let ctx = RequestContext::new("GET", "/");
        let snap = ContextSnapshot::capture(
            Some(&ctx),
            SnapshotOptions::post_upgrade().without_session_creation(),
        )
        .unwrap();
        assert!(snap.session().is_none());
        assert!(ctx.session().is_none());
    }

    #[test]
    fn release_drops_held_resources() {
        let ctx = sample_request();
        let mut snap =
            ContextSnapshot::capture(Some(&ctx), SnapshotOptions::post_upgrade()).unwrap();
        snap.release();
        assert!(snap.body().is_none());
        assert!(snap.headers().is_empty());
        assert!(snap.session().is_none());
    }
}
