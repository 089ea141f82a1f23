//! FFT frame type and the frame delivery channel

/// One FFT snapshot: magnitudes in a log-power (dB-like) unit plus the
/// center frequency the snapshot was taken at.
///
/// The bin count may change between frames; consumers resize their buffers
/// when it does.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub center_freq: f64,
    pub magnitudes: Vec<f32>,
}

impl Frame {
    pub fn new(center_freq: f64, magnitudes: Vec<f32>) -> Self {
        Self {
            center_freq,
            magnitudes,
        }
    }

    /// Number of FFT bins in this frame.
    #[inline]
    pub fn len(&self) -> usize {
        self.magnitudes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.magnitudes.is_empty()
    }
}

/// Create a frame channel: the producer side never blocks, the consumer side
/// is drained on the render thread once per tick.
pub fn frame_channel() -> (FrameSender, FrameSource) {
    let (tx, rx) = flume::unbounded();
    (FrameSender { tx }, FrameSource { rx })
}

/// Producer handle. `send` never blocks; frames sent after the consumer is
/// dropped are discarded.
#[derive(Clone)]
pub struct FrameSender {
    tx: flume::Sender<Frame>,
}

impl FrameSender {
    pub fn send(&self, frame: Frame) {
        if self.tx.send(frame).is_err() {
            log::trace!("frame dropped: no consumer attached");
        }
    }
}

/// Consumer handle owned by the widget layer.
pub struct FrameSource {
    rx: flume::Receiver<Frame>,
}

impl FrameSource {
    /// Deliver every queued frame to `f`, in arrival order. Returns the
    /// number of frames delivered.
    pub fn drain(&self, mut f: impl FnMut(Frame)) -> usize {
        let mut count = 0;
        while let Ok(frame) = self.rx.try_recv() {
            f(frame);
            count += 1;
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_len() {
        let frame = Frame::new(100e6, vec![-90.0; 512]);
        assert_eq!(frame.len(), 512);
        assert!(!frame.is_empty());
    }

    #[test]
    fn test_channel_delivers_in_order() {
        let _ = env_logger::builder().is_test(true).try_init();
        let (tx, source) = frame_channel();
        tx.send(Frame::new(100e6, vec![0.0]));
        tx.send(Frame::new(101e6, vec![1.0]));

        let mut freqs = Vec::new();
        let n = source.drain(|frame| freqs.push(frame.center_freq));
        assert_eq!(n, 2);
        assert_eq!(freqs, vec![100e6, 101e6]);

        // Nothing left after a drain
        assert_eq!(source.drain(|_| ()), 0);
    }

    #[test]
    fn test_send_without_consumer_does_not_block() {
        let (tx, source) = frame_channel();
        drop(source);
        tx.send(Frame::new(100e6, vec![0.0]));
    }
}
