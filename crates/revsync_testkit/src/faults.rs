//! Network failure injection.
//!
//! [`FaultyStore`] sits between a session and a [`DocumentServer`] and
//! fails scripted bulk writes at a chosen point, so tests can check that
//! a failed flush leaves the session consistent and that retrying it
//! converges.
//!
//! ## Failure points
//!
//! - **Before send**: nothing reaches the server
//! - **Lost request**: the request times out without being applied
//! - **Lost response**: the server applies the batch, the answer is lost
//! - **Truncated response**: the server applies the batch, the answer is malformed
//! - **Cancel after apply**: the server applies the batch, the caller cancels

use parking_lot::Mutex;
use revsync_engine::{CancelHandle, DocumentStore, SyncError, SyncResult};
use revsync_protocol::{BulkWriteRequest, BulkWriteResponse, FetchRequest, FetchResponse};
use revsync_store::DocumentServer;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Points at which a bulk write can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Connection refused; the server never sees the request.
    FailBeforeSend,
    /// The request times out before the server applies it.
    LostRequest,
    /// The server applies the batch but the response never arrives.
    LostResponse,
    /// The server applies the batch and answers with a truncated result list.
    TruncatedResponse,
    /// The server applies the batch and the flush is cancelled before the
    /// response is read.
    CancelAfterApply,
}

impl Fault {
    /// Every failure point.
    pub const ALL: [Fault; 5] = [
        Fault::FailBeforeSend,
        Fault::LostRequest,
        Fault::LostResponse,
        Fault::TruncatedResponse,
        Fault::CancelAfterApply,
    ];

    /// Returns true if the server applies the batch before the failure.
    pub fn applies(&self) -> bool {
        matches!(
            self,
            Fault::LostResponse | Fault::TruncatedResponse | Fault::CancelAfterApply
        )
    }
}

/// A store that fails scripted bulk writes.
///
/// Fetches always pass through. Bulk writes consume one scripted fault
/// each; once the script is empty they pass through too.
pub struct FaultyStore {
    server: Arc<DocumentServer>,
    faults: Mutex<VecDeque<Fault>>,
    cancel: Mutex<Option<CancelHandle>>,
    injected: AtomicUsize,
}

impl FaultyStore {
    /// Wraps a server.
    pub fn new(server: Arc<DocumentServer>) -> Self {
        Self {
            server,
            faults: Mutex::new(VecDeque::new()),
            cancel: Mutex::new(None),
            injected: AtomicUsize::new(0),
        }
    }

    /// Handle tripped by [`Fault::CancelAfterApply`].
    pub fn set_cancel_handle(&self, handle: CancelHandle) {
        *self.cancel.lock() = Some(handle);
    }

    /// Queues a fault for the next unscripted bulk write.
    pub fn push_fault(&self, fault: Fault) {
        self.faults.lock().push_back(fault);
    }

    /// Number of faults not yet injected.
    pub fn pending_faults(&self) -> usize {
        self.faults.lock().len()
    }

    /// Number of faults injected so far.
    pub fn injected(&self) -> usize {
        self.injected.load(Ordering::SeqCst)
    }

    /// The wrapped server.
    pub fn server(&self) -> &Arc<DocumentServer> {
        &self.server
    }
}

impl DocumentStore for FaultyStore {
    fn bulk_write(&self, request: &BulkWriteRequest) -> SyncResult<BulkWriteResponse> {
        let Some(fault) = self.faults.lock().pop_front() else {
            return self.server.bulk_write(request);
        };
        self.injected.fetch_add(1, Ordering::SeqCst);

        match fault {
            Fault::FailBeforeSend => Err(SyncError::transport_retryable("connection refused")),
            Fault::LostRequest => Err(SyncError::Timeout),
            Fault::LostResponse => {
                self.server.bulk_write(request)?;
                Err(SyncError::Timeout)
            }
            Fault::TruncatedResponse => {
                let mut response = self.server.bulk_write(request)?;
                response.results.pop();
                Ok(response)
            }
            Fault::CancelAfterApply => {
                let response = self.server.bulk_write(request)?;
                if let Some(handle) = self.cancel.lock().as_ref() {
                    handle.cancel();
                }
                Ok(response)
            }
        }
    }

    fn fetch(&self, request: &FetchRequest) -> SyncResult<FetchResponse> {
        self.server.fetch(request)
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn close(&self) -> SyncResult<()> {
        Ok(())
    }
}
