pub(crate) mod file_record;
pub(crate) mod mask_write;
pub(crate) mod read_bits;
pub(crate) mod read_fifo;
pub(crate) mod read_registers;
pub(crate) mod read_write_multiple;
pub(crate) mod write_multiple;
pub(crate) mod write_single;

use crate::error::RequestError;

/// completes a pending request exactly once
pub(crate) struct Promise<T> {
    tx: tokio::sync::oneshot::Sender<Result<T, RequestError>>,
}

impl<T> Promise<T> {
    pub(crate) fn channel() -> (Self, tokio::sync::oneshot::Receiver<Result<T, RequestError>>) {
        let (tx, rx) = tokio::sync::oneshot::channel();
        (Self { tx }, rx)
    }

    pub(crate) fn failure(self, err: RequestError) {
        self.complete(Err(err))
    }

    pub(crate) fn complete(self, result: Result<T, RequestError>) {
        // the other side may have given up waiting
        self.tx.send(result).ok();
    }
}
