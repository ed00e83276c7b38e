use asc_export_api::{
    ExportError,
    ExportResult,
    TwoFactorPrompt,
};
use async_trait::async_trait;
use tokio::io::{
    AsyncBufRead,
    AsyncBufReadExt,
    AsyncWrite,
    AsyncWriteExt,
    BufReader,
};
use tokio::sync::Mutex;

const PROMPT: &str = "Enter 2SV code: ";

/// Asks for the two-step verification code on a terminal
pub struct TerminalPrompt<R, W> {
    io: Mutex<(R, W)>,
}

impl TerminalPrompt<BufReader<tokio::io::Stdin>, tokio::io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> TerminalPrompt<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            io: Mutex::new((reader, writer)),
        }
    }
}

fn io_error(e: std::io::Error) -> ExportError {
    ExportError::Auth(format!("Error reading 2SV code: {}", e))
}

#[async_trait]
impl<R, W> TwoFactorPrompt for TerminalPrompt<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn request_code(&self) -> ExportResult<String> {
        let mut io = self.io.lock().await;
        let (reader, writer) = &mut *io;

        writer.write_all(PROMPT.as_bytes()).await.map_err(io_error)?;
        writer.flush().await.map_err(io_error)?;

        let mut line = String::new();
        reader.read_line(&mut line).await.map_err(io_error)?;

        Ok(line.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reads_trimmed_code() {
        let prompt = TerminalPrompt::new(&b" 123456\n"[..], Vec::new());

        assert_eq!(prompt.request_code().await.unwrap(), "123456");

        let io = prompt.io.lock().await;
        assert_eq!(io.1, PROMPT.as_bytes());
    }

    #[tokio::test]
    async fn test_closed_input_gives_empty_code() {
        let prompt = TerminalPrompt::new(&b""[..], Vec::new());
        assert_eq!(prompt.request_code().await.unwrap(), "");
    }
}
