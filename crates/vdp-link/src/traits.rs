use crate::error::Result;

/// Default line rate for serial-style links.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Link setup parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkConfig {
    /// Line rate in bits per second. Links without a line rate ignore it.
    pub baud_rate: u32,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}

/// A non-blocking, byte-oriented link to exactly one peer.
///
/// Every method returns immediately. Callers poll [`bytes_available`] and
/// [`write_free`] to decide how much work to do; nothing here ever waits for
/// the peer.
///
/// [`bytes_available`]: Link::bytes_available
/// [`write_free`]: Link::write_free
pub trait Link: Send {
    /// Enable the link and apply line settings.
    fn configure(&mut self, _config: &LinkConfig) -> Result<()> {
        Ok(())
    }

    /// Number of received bytes that can be read without waiting.
    fn bytes_available(&mut self) -> Result<usize>;

    /// Free space in the outbound buffer, in bytes.
    fn write_free(&mut self) -> Result<usize>;

    /// Read up to `buf.len()` bytes. Returns `Ok(0)` when nothing is pending.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write as much of `buf` as fits right now and return the count written.
    ///
    /// A short count is not an error; the caller decides what it means.
    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    /// Reset the outbound buffer.
    ///
    /// Bytes the peer has not consumed yet may be discarded. Used to bound
    /// latency when the buffer backs up, not to guarantee delivery.
    fn flush(&mut self) -> Result<()>;

    /// Link name for diagnostics.
    fn name(&self) -> &'static str;
}

impl<L: Link + ?Sized> Link for Box<L> {
    fn configure(&mut self, config: &LinkConfig) -> Result<()> {
        (**self).configure(config)
    }

    fn bytes_available(&mut self) -> Result<usize> {
        (**self).bytes_available()
    }

    fn write_free(&mut self) -> Result<usize> {
        (**self).write_free()
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        (**self).write(buf)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}
