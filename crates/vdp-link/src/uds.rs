use std::io::{ErrorKind, Read, Write};
use std::os::fd::AsRawFd;
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{LinkError, Result};
use crate::traits::{Link, LinkConfig};

/// Send-buffer size assumed when the platform cannot report one.
const FALLBACK_SEND_BUFFER: usize = 8 * 1024;

/// Listening Unix domain socket that hands out [`UnixLink`]s.
///
/// Filesystem sockets are cleaned up on drop, but only if the path still
/// refers to the socket this listener created.
pub struct UnixLinkListener {
    listener: UnixListener,
    path: PathBuf,
    created_inode: Option<(u64, u64)>,
}

impl UnixLinkListener {
    /// Default permission mode for created socket paths.
    pub const DEFAULT_SOCKET_MODE: u32 = 0o600;
    /// Maximum socket path length.
    /// Unix `sockaddr_un.sun_path` is typically 108 bytes on Linux, 104 on macOS.
    #[cfg(target_os = "linux")]
    const MAX_PATH_LEN: usize = 108;
    #[cfg(not(target_os = "linux"))]
    const MAX_PATH_LEN: usize = 104;

    /// Bind and listen on a filesystem-path Unix domain socket.
    ///
    /// A stale socket already at `path` is removed first. Any other kind of
    /// file at `path` is left alone and binding fails.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let path_bytes = path.as_os_str().len();
        if path_bytes >= Self::MAX_PATH_LEN {
            return Err(LinkError::PathTooLong {
                path,
                len: path_bytes,
                max: Self::MAX_PATH_LEN,
            });
        }

        let bind_err = |source: std::io::Error| LinkError::Bind {
            path: path.clone(),
            source,
        };

        if path.exists() {
            let metadata = std::fs::symlink_metadata(&path).map_err(bind_err)?;
            if !metadata.file_type().is_socket() {
                return Err(bind_err(std::io::Error::new(
                    ErrorKind::AlreadyExists,
                    "existing path is not a unix socket",
                )));
            }
            debug!(?path, "removing stale socket");
            std::fs::remove_file(&path).map_err(bind_err)?;
        }

        let listener = UnixListener::bind(&path).map_err(bind_err)?;
        std::fs::set_permissions(
            &path,
            std::fs::Permissions::from_mode(Self::DEFAULT_SOCKET_MODE),
        )
        .map_err(bind_err)?;
        let created = std::fs::symlink_metadata(&path).map_err(bind_err)?;

        info!(?path, "listening for link peer");

        Ok(Self {
            listener,
            path,
            created_inode: Some((created.dev(), created.ino())),
        })
    }

    /// Wait for one peer and return a non-blocking link to it.
    pub fn accept(&self) -> Result<UnixLink> {
        let (stream, _addr) = self.listener.accept().map_err(LinkError::Accept)?;
        debug!(path = ?self.path, "accepted link peer");
        UnixLink::from_stream(stream)
    }

    /// The path this socket is bound to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for UnixLinkListener {
    fn drop(&mut self) {
        let Some((expected_dev, expected_ino)) = self.created_inode else {
            return;
        };
        if let Ok(metadata) = std::fs::symlink_metadata(&self.path) {
            if metadata.file_type().is_socket()
                && metadata.dev() == expected_dev
                && metadata.ino() == expected_ino
            {
                debug!(path = ?self.path, "cleaning up socket file");
                let _ = std::fs::remove_file(&self.path);
            } else {
                debug!(path = ?self.path, "socket path identity changed; skipping cleanup");
            }
        }
    }
}

/// A non-blocking Unix domain stream used as a byte link.
///
/// Sockets have no line rate and no way to discard queued kernel bytes, so
/// [`Link::configure`] only validates its input and [`Link::flush`] does
/// nothing.
#[derive(Debug)]
pub struct UnixLink {
    stream: UnixStream,
}

impl UnixLink {
    /// Connect to a listening socket.
    pub fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let stream = UnixStream::connect(path).map_err(|source| LinkError::Connect {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(?path, "connected link peer");
        Self::from_stream(stream)
    }

    /// Wrap an already-connected stream, switching it to non-blocking mode.
    pub fn from_stream(stream: UnixStream) -> Result<Self> {
        stream.set_nonblocking(true)?;
        Ok(Self { stream })
    }

    /// Create two connected links (mostly useful in tests).
    pub fn pair() -> Result<(Self, Self)> {
        let (a, b) = UnixStream::pair()?;
        Ok((Self::from_stream(a)?, Self::from_stream(b)?))
    }

    fn queued_inbound(&self) -> Result<usize> {
        let mut count: libc::c_int = 0;
        // SAFETY: `count` is a valid writable c_int and the fd is an open socket owned by `self`.
        let rc = unsafe {
            libc::ioctl(
                self.stream.as_raw_fd(),
                libc::FIONREAD as _,
                &mut count as *mut libc::c_int,
            )
        };
        if rc != 0 {
            return Err(std::io::Error::last_os_error().into());
        }
        Ok(usize::try_from(count).unwrap_or(0))
    }

    fn peer_closed(&self) -> Result<bool> {
        let mut peek_buf = [0u8; 1];
        // SAFETY: `peek_buf` is a valid writable buffer of the given length and the fd is open.
        let rc = unsafe {
            libc::recv(
                self.stream.as_raw_fd(),
                peek_buf.as_mut_ptr().cast::<libc::c_void>(),
                peek_buf.len(),
                libc::MSG_PEEK,
            )
        };
        if rc == 0 {
            return Ok(true);
        }
        if rc < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == ErrorKind::WouldBlock || err.kind() == ErrorKind::Interrupted {
                return Ok(false);
            }
            return Err(err.into());
        }
        Ok(false)
    }

    fn send_buffer_size(&self) -> usize {
        let mut size: libc::c_int = 0;
        let mut len = std::mem::size_of::<libc::c_int>() as libc::socklen_t;
        // SAFETY: `size` and `len` are valid writable pointers for the provided sizes.
        let rc = unsafe {
            libc::getsockopt(
                self.stream.as_raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_SNDBUF,
                (&mut size as *mut libc::c_int).cast::<libc::c_void>(),
                &mut len,
            )
        };
        if rc == 0 {
            usize::try_from(size).unwrap_or(FALLBACK_SEND_BUFFER)
        } else {
            FALLBACK_SEND_BUFFER
        }
    }

    #[cfg(target_os = "linux")]
    fn queued_outbound(&self) -> usize {
        let mut count: libc::c_int = 0;
        // SAFETY: `count` is a valid writable c_int and the fd is an open socket owned by `self`.
        let rc = unsafe {
            libc::ioctl(
                self.stream.as_raw_fd(),
                libc::TIOCOUTQ as _,
                &mut count as *mut libc::c_int,
            )
        };
        if rc == 0 {
            usize::try_from(count).unwrap_or(0)
        } else {
            0
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn queued_outbound(&self) -> usize {
        0
    }
}

impl Link for UnixLink {
    fn configure(&mut self, config: &LinkConfig) -> Result<()> {
        if config.baud_rate == 0 {
            return Err(LinkError::UnsupportedBaudRate(config.baud_rate));
        }
        Ok(())
    }

    fn bytes_available(&mut self) -> Result<usize> {
        let queued = self.queued_inbound()?;
        if queued == 0 && self.peer_closed()? {
            return Err(LinkError::Closed);
        }
        Ok(queued)
    }

    fn write_free(&mut self) -> Result<usize> {
        Ok(self
            .send_buffer_size()
            .saturating_sub(self.queued_outbound()))
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            match self.stream.read(buf) {
                Ok(0) => return Err(LinkError::Closed),
                Ok(n) => return Ok(n),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(0),
                Err(err) => return Err(LinkError::Io(err)),
            }
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        loop {
            match self.stream.write(buf) {
                Ok(n) => return Ok(n),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(0),
                Err(err) if err.kind() == ErrorKind::BrokenPipe => return Err(LinkError::Closed),
                Err(err) => return Err(LinkError::Io(err)),
            }
        }
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "unix-domain-socket"
    }
}
