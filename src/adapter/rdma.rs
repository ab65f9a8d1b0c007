//! Adapters over an abstract queue pair for remote memory domains.
//!
//! One adapter per transport verb, each a thin wrapper around a shared
//! [`QueuePair`] connection handle. The write and read adapters carry the
//! one-sided data path; the send/recv pair covers message-oriented control
//! traffic where one-sided access is not applicable.

use std::sync::Arc;

use crate::remote::QueuePair;

use super::TransferAdapter;

/// One-sided push: `transfer(src, dst)` writes the local window into the
/// peer's exported window. Completion fires when the queue pair signals the
/// write has landed.
pub struct RemoteWriteAdapter<Q: QueuePair> {
    qp: Arc<Q>,
}

impl<Q: QueuePair> RemoteWriteAdapter<Q> {
    pub fn new(qp: Arc<Q>) -> Self {
        Self { qp }
    }
}

impl<Q: QueuePair> Clone for RemoteWriteAdapter<Q> {
    fn clone(&self) -> Self {
        Self {
            qp: Arc::clone(&self.qp),
        }
    }
}

impl<Q: QueuePair> TransferAdapter for RemoteWriteAdapter<Q> {
    type LocalBuf = Q::LocalBuf;
    type RemoteBuf = Q::RemoteBuf;
    type Completion = Q::Completion;

    fn transfer(&mut self, src: &Self::LocalBuf, dst: &Self::RemoteBuf) -> Self::Completion {
        self.qp.post_write(src, dst)
    }
}

/// One-sided pull: `transfer(src, dst)` fetches the peer's window `dst` into
/// the local window `src`.
pub struct RemoteReadAdapter<Q: QueuePair> {
    qp: Arc<Q>,
}

impl<Q: QueuePair> RemoteReadAdapter<Q> {
    pub fn new(qp: Arc<Q>) -> Self {
        Self { qp }
    }
}

impl<Q: QueuePair> Clone for RemoteReadAdapter<Q> {
    fn clone(&self) -> Self {
        Self {
            qp: Arc::clone(&self.qp),
        }
    }
}

impl<Q: QueuePair> TransferAdapter for RemoteReadAdapter<Q> {
    type LocalBuf = Q::LocalBuf;
    type RemoteBuf = Q::RemoteBuf;
    type Completion = Q::Completion;

    fn transfer(&mut self, src: &Self::LocalBuf, dst: &Self::RemoteBuf) -> Self::Completion {
        self.qp.post_read(src, dst)
    }
}

/// Two-sided send. Only the local window participates; the remote window is
/// accepted for interface compatibility and ignored.
pub struct RemoteSendAdapter<Q: QueuePair> {
    qp: Arc<Q>,
}

impl<Q: QueuePair> RemoteSendAdapter<Q> {
    pub fn new(qp: Arc<Q>) -> Self {
        Self { qp }
    }
}

impl<Q: QueuePair> TransferAdapter for RemoteSendAdapter<Q> {
    type LocalBuf = Q::LocalBuf;
    type RemoteBuf = Q::RemoteBuf;
    type Completion = Q::Completion;

    fn transfer(&mut self, src: &Self::LocalBuf, _dst: &Self::RemoteBuf) -> Self::Completion {
        self.qp.post_send(src)
    }
}

/// Two-sided receive. The local window is the delivery target; completion
/// fires when a matching send arrives.
pub struct RemoteRecvAdapter<Q: QueuePair> {
    qp: Arc<Q>,
}

impl<Q: QueuePair> RemoteRecvAdapter<Q> {
    pub fn new(qp: Arc<Q>) -> Self {
        Self { qp }
    }
}

impl<Q: QueuePair> TransferAdapter for RemoteRecvAdapter<Q> {
    type LocalBuf = Q::LocalBuf;
    type RemoteBuf = Q::RemoteBuf;
    type Completion = Q::Completion;

    fn transfer(&mut self, src: &Self::LocalBuf, _dst: &Self::RemoteBuf) -> Self::Completion {
        self.qp.post_recv(src)
    }
}
