//! Queue plumbing shared by the asynchronous datagram sinks.

use std::{
    io::{
        Error,
        ErrorKind,
        Result,
    },
    panic::{
        catch_unwind,
        RefUnwindSafe,
        UnwindSafe,
    },
    process::abort,
};

use tokio::sync::mpsc::{
    error::TrySendError,
    Sender,
};

pub trait TrySend: UnwindSafe + RefUnwindSafe {
    fn sender(&self) -> &Sender<String>;

    /// Enqueues one datagram without waiting.
    ///
    /// A full queue maps to `WouldBlock`, a stopped worker to `Other`.
    fn try_send(&self, datagram: String) -> Result<()> {
        // self.tx is !RefUnwindSafe -- don't let it panic!
        let wrapped = catch_unwind(|| self.sender().try_send(datagram));

        match wrapped {
            Ok(res) => {
                if let Err(e) = res {
                    let kind = match e {
                        TrySendError::Full(_) => ErrorKind::WouldBlock,
                        TrySendError::Closed(_) => ErrorKind::Other,
                    };

                    return Err(Error::new(kind, e.to_string()));
                }
            }

            Err(e) => {
                eprintln!("panic while attempting to enqueue statsd datagram: {:?}", e);
                abort();
            }
        }

        Ok(())
    }
}

/// Defines `do_send` and `worker` for a socket type exposing
/// `async fn send_to(&mut self, buf: &[u8], target) -> io::Result<usize>`-like semantics.
macro_rules! define_worker {
    ($SocketType:ty, $TargetType:ty) => {
        define_worker!($SocketType, $TargetType, &$TargetType);
    };

    ($SocketType:ty, $TargetType:ty, $TargetTypeRef:ty) => {
        async fn do_send(socket: &mut $SocketType, addr: $TargetTypeRef, datagram: &str) {
            use log::*;

            match socket.send_to(datagram.as_bytes(), addr).await {
                Ok(n) => {
                    debug!("sent {} bytes", n);
                }

                Err(e) => {
                    error!("failed to send metrics: {:?}", e);
                }
            }
        }

        /// Sends every queued datagram, one `send_to` per datagram, until all senders
        /// are gone and the queue is drained.
        async fn worker(
            mut rx: tokio::sync::mpsc::Receiver<String>,
            mut socket: $SocketType,
            addr: $TargetType,
        ) {
            use log::*;

            while let Some(datagram) = rx.recv().await {
                trace!("write: {}", datagram);
                do_send(&mut socket, &addr, &datagram).await;
            }

            debug!("stop");
        }
    };
}
