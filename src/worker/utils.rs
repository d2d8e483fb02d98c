use async_fs::File as AsyncFile;
use async_process::unix::CommandExt;
use async_process::{Child, Command};
use futures_lite::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};
use nix::unistd;
use std::fs::File as StdFile;
use std::io;
use std::os::unix::io::{FromRawFd, RawFd};

pub(super) struct SpawnResult {
    pub(super) child: Child,
    pub(super) channel_reader: AsyncFile,
    pub(super) channel_writer: AsyncFile,
    pub(super) payload_channel_reader: AsyncFile,
    pub(super) payload_channel_writer: AsyncFile,
}

/// Spawn worker process with channels on file descriptors 3 (requests), 4 (responses and
/// notifications), 5 (payload requests) and 6 (payload responses and notifications).
pub(super) fn spawn_with_worker_channels(command: &mut Command) -> io::Result<SpawnResult> {
    let (producer_fd_read, producer_fd_write) = unistd::pipe()?;
    let (consumer_fd_read, consumer_fd_write) = unistd::pipe()?;
    let (producer_payload_fd_read, producer_payload_fd_write) = unistd::pipe()?;
    let (consumer_payload_fd_read, consumer_payload_fd_write) = unistd::pipe()?;

    unsafe {
        command.pre_exec(move || {
            // Unused in child
            unistd::close(producer_fd_write)?;
            unistd::close(consumer_fd_read)?;
            unistd::close(producer_payload_fd_write)?;
            unistd::close(consumer_payload_fd_read)?;
            // Now duplicate into file descriptor indexes we need
            move_fd(producer_fd_read, 3)?;
            move_fd(consumer_fd_write, 4)?;
            move_fd(producer_payload_fd_read, 5)?;
            move_fd(consumer_payload_fd_write, 6)?;

            Ok(())
        });
    }

    let child = command.spawn()?;

    // Unused in parent
    unistd::close(producer_fd_read)?;
    unistd::close(consumer_fd_write)?;
    unistd::close(producer_payload_fd_read)?;
    unistd::close(consumer_payload_fd_write)?;

    Ok(SpawnResult {
        child,
        channel_reader: file_from_fd(consumer_fd_read),
        channel_writer: file_from_fd(producer_fd_write),
        payload_channel_reader: file_from_fd(consumer_payload_fd_read),
        payload_channel_writer: file_from_fd(producer_payload_fd_write),
    })
}

fn move_fd(fd: RawFd, target: RawFd) -> io::Result<()> {
    if fd != target {
        unistd::dup2(fd, target)?;
        unistd::close(fd)?;
    }

    Ok(())
}

fn file_from_fd(fd: RawFd) -> AsyncFile {
    // Descriptor comes straight from `pipe()` and is owned by nobody else in this process
    unsafe { StdFile::from_raw_fd(fd) }.into()
}

/// Read one netstring (`<len>:<bytes>,`), returns `None` on clean EOF.
pub(super) async fn read_netstring<R>(reader: &mut R, max_len: usize) -> io::Result<Option<Vec<u8>>>
where
    R: AsyncBufRead + Unpin,
{
    let mut len_bytes = Vec::new();
    if reader.read_until(b':', &mut len_bytes).await? == 0 {
        return Ok(None);
    }
    if len_bytes.pop() != Some(b':') {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "truncated netstring length",
        ));
    }

    let length = std::str::from_utf8(&len_bytes)
        .ok()
        .and_then(|length| length.trim().parse::<usize>().ok())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "invalid netstring length"))?;

    if length > max_len {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "received message {} is too long, max supported is {}",
                length, max_len
            ),
        ));
    }

    // +1 because of netstring's `,` at the very end
    let mut bytes = vec![0u8; length + 1];
    reader.read_exact(&mut bytes).await?;
    if bytes.pop() != Some(b',') {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "missing netstring terminator",
        ));
    }

    Ok(Some(bytes))
}

/// Append netstring representation of `message` to `bytes`.
pub(super) fn write_netstring(bytes: &mut Vec<u8>, message: &[u8]) {
    bytes.extend_from_slice(message.len().to_string().as_bytes());
    bytes.push(b':');
    bytes.extend_from_slice(message);
    bytes.push(b',');
}
