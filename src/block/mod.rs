use log::error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::{DigSigProcErr as DSPErr};

/// Inputs queued ahead of a block before senders have to wait
pub const QUEUE_DEPTH:usize = 4;

pub enum BlockResult<U> {
	NotReady,
	Ready(U),
	Err(DSPErr)
}

// A type that implements BlockFunctionality consumes instances of T and produces Ready(U) if an output is ready,
// NotReady if it is not, or Err(_) if the operation fails.  A failed block stops taking input.
pub trait BlockFunctionality<T, U> {
	fn apply(&mut self, input:&T) -> BlockResult<U>;
}

/// A processing stage running on its own thread from the blocking pool, so a long `apply` never stalls the async
/// side.  It owns its state outright, so nothing inside needs a lock, and both of its queues are bounded so a
/// slow stage holds back whoever feeds it.
pub struct Block<T: 'static + Send, U: 'static + Send> {
	pub tx_input:  mpsc::Sender<T>,
	pub rx_output: mpsc::Receiver<U>,
	handle:        JoinHandle<Result<(), DSPErr>>,
}

impl<T: Send + Sync, U: Send + Sync> Block<T, U> {

	pub fn from<B: 'static + BlockFunctionality<T, U> + Send>(b:B) -> Self {

		let (tx_input,  mut rx_input) = mpsc::channel::<T>(QUEUE_DEPTH);
		let (tx_output,     rx_output) = mpsc::channel::<U>(QUEUE_DEPTH);

		let handle:JoinHandle<Result<(), DSPErr>> = tokio::task::spawn_blocking(move || {

			let mut owned_b = b;

			while let Some(t) = rx_input.blocking_recv() {
				match owned_b.apply(&t) {
					BlockResult::Ready(u) => tx_output.blocking_send(u).map_err(|_| DSPErr::Other("Unable to send block output"))?,
					BlockResult::NotReady => (),
					BlockResult::Err(e)   => {
						error!("Error in block: {}", e);
						return Err(e);
					}
				}
			}

			Ok(())
		});

		Block{ tx_input, rx_output, handle }
	}

	/// Queues one input, waiting for room if the block is behind.  Fails once the block has stopped.
	pub async fn send(&self, t:T) -> Result<(), DSPErr> {
		self.tx_input.send(t).await.map_err(|_| DSPErr::Other("Block is no longer accepting input"))
	}

	/// Next output, or None once the block has stopped
	pub async fn recv(&mut self) -> Option<U> { self.rx_output.recv().await }

	pub async fn shutdown(self) -> Result<(), DSPErr> {
		let Block{ tx_input, rx_output, handle } = self;

		drop(tx_input);
		drop(rx_output);

		handle.await.map_err(|_| DSPErr::Other("Block task panicked or was cancelled"))?
	}

}
