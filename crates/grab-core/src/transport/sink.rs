//! Destinations for streamed response bodies.

use std::io;

/// Receives a response body chunk by chunk.
pub trait BodySink {
    fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()>;

    /// Discards everything written so far. Called before every attempt so a
    /// retried request starts from an empty body.
    fn reset(&mut self) -> io::Result<()>;
}

impl BodySink for Vec<u8> {
    fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.extend_from_slice(chunk);
        Ok(())
    }

    fn reset(&mut self) -> io::Result<()> {
        self.clear();
        Ok(())
    }
}

/// Adapts a closure into a sink. A closure cannot be rewound, so a retry
/// after the first chunk was delivered fails instead of duplicating data.
pub struct FnSink<F> {
    f: F,
    started: bool,
}

impl<F> FnSink<F>
where
    F: FnMut(&[u8]) -> io::Result<()>,
{
    pub fn new(f: F) -> Self {
        Self { f, started: false }
    }
}

impl<F> BodySink for FnSink<F>
where
    F: FnMut(&[u8]) -> io::Result<()>,
{
    fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.started = true;
        (self.f)(chunk)
    }

    fn reset(&mut self) -> io::Result<()> {
        if self.started {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "streamed body cannot be rewound for a retry",
            ));
        }
        Ok(())
    }
}
