//! The Node struct is a convenience wrapper around a [`Transport`] and
//! [`TransferManager`] pair. It handles ingesting raw frames and turning
//! completed TX transfers into outgoing frames. Currently the only coupling
//! between TX and RX is the node ID, which is cheap to replicate.
//!
//! Higher-level routing (matching frames to subscriptions, allocating output
//! sessions) lives in [`crate::session`]; this type only knows about a single
//! transfer-manager instance, not the whole dispatch table.

use core::marker::PhantomData;

use crate::transfer::TransferManager;
use crate::transfer::manager::{CreateTransferError, TokenAccessError, UpdateTransferError};
use crate::transport::Transport;
use crate::{RxError, TransferKind, TxError, types::*};

/// Node implementation. Generic across transfer managers and transport types.
#[derive(Debug)]
pub struct Node<M: TransferManager<C, T>, C: embedded_time::Clock, T: Transport<C>> {
    id: Option<NodeId>,

    /// Transfer manager. Made public so it can be managed directly by the
    /// caller (e.g. to invoke `update_transfers` on a timer tick).
    pub transfer_manager: M,

    _clock: PhantomData<C>,
    _transport: PhantomData<T>,
}

#[derive(Copy, Clone, Debug)]
pub enum TransmitFrameError {
    TokenError(TokenAccessError),
    TxError(TxError),
    /// The transfer manager returned success without ever invoking our
    /// callback; this indicates a bug in the `TransferManager` impl in use.
    InvalidHandling,
}

impl<M, C, T> Node<M, C, T>
where
    M: TransferManager<C, T>,
    C: embedded_time::Clock,
    T: Transport<C>,
{
    pub fn new(id: Option<NodeId>, transfer_manager: M) -> Self {
        Self {
            id,
            transfer_manager,
            _clock: PhantomData,
            _transport: PhantomData,
        }
    }

    pub fn node_id(&self) -> Option<NodeId> {
        self.id
    }

    pub fn set_node_id(&mut self, id: NodeId) {
        self.id = Some(id);
    }

    /// Ingests a raw transport frame, returning a token for the completed
    /// receive transfer if this frame was the last one needed.
    pub fn try_receive_frame(
        &mut self,
        frame: &T::Frame,
    ) -> Result<Option<M::RxTransferToken>, RxError> {
        let (frame, frame_metadata) = T::rx_process_frame(frame)?;

        // Check if a message is for us
        if let Some(node_id) = frame.metadata.remote_node_id {
            match frame.metadata.transfer_kind {
                TransferKind::Message => {
                    return Err(RxError::MessageWithRemoteId);
                }
                TransferKind::Request | TransferKind::Response => match self.id {
                    Some(id) => {
                        if node_id != id {
                            // Targeted message, but not for us
                            return Ok(None);
                        }
                    }
                    None => {
                        // Targeted message, but we are anonymous
                        return Ok(None);
                    }
                },
            }
        }

        match self.transfer_manager.append_frame(&frame, &frame_metadata) {
            Ok(tok) => Ok(tok),
            Err(UpdateTransferError::NoSpace) => Ok(None),
            Err(UpdateTransferError::TimedOut) => Ok(None),
            Err(UpdateTransferError::RxError(e)) => Err(e),
            Err(UpdateTransferError::DoesNotExist) => {
                if !frame.first_frame {
                    return Err(RxError::NewSessionNoStart);
                }

                match self.transfer_manager.new_transfer(&frame, &frame_metadata) {
                    Ok(tok) => Ok(tok),
                    // Theoretically unreachable: we just confirmed no transfer exists.
                    Err(CreateTransferError::AlreadyExists) => Ok(None),
                    Err(CreateTransferError::NoSpace) => Ok(None),
                    Err(CreateTransferError::RxError(e)) => Err(e),
                }
            }
        }
    }

    /// Creates the next frame for an in-flight TX transfer, returning a new
    /// token if more frames remain to be sent.
    pub fn transmit_frame(
        &mut self,
        token: M::TxTransferToken,
        timestamp: embedded_time::Instant<C>,
    ) -> Result<(T::Frame, Option<M::TxTransferToken>), TransmitFrameError> {
        let id = self.id;
        let mut frame_out = Err(TransmitFrameError::InvalidHandling);

        let res = self.transfer_manager.transmit(token, |metadata, transport_metadata, data| {
            match T::transmit_frame(metadata, transport_metadata, data, id, timestamp) {
                Ok((frame, consumed)) => {
                    frame_out = Ok(frame);
                    consumed
                }
                Err(e) => {
                    frame_out = Err(TransmitFrameError::TxError(e));
                    0
                }
            }
        });

        match res {
            Ok(next_token) => match frame_out {
                Ok(frame) => Ok((frame, next_token)),
                Err(TransmitFrameError::TxError(e)) => {
                    if let Some(next_token) = next_token {
                        // The token is known-good; we're aborting because of the
                        // TX error we just observed, not a token problem.
                        let _ = self.transfer_manager.cancel_tx_transfer(next_token);
                    }
                    Err(TransmitFrameError::TxError(e))
                }
                Err(e) => Err(e),
            },
            Err(e) => Err(TransmitFrameError::TokenError(e)),
        }
    }
}
