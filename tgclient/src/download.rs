use anyhow::{Context as _, Result};
use async_trait::async_trait;
use grammers_client::grammers_tl_types as tl;
use std::path::Path;
use std::pin::Pin;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWriteExt, ReadBuf};
use tokio::sync::mpsc;
use tracing::debug;

use crate::client::TgClient;
use tg_core::model::{FileLocation, MediaKind, TGFile};
use tg_core::runtime::MediaSource;

/// MTProto 分片下载的单片大小 (512 KiB, 必须是 4 KiB 的倍数)
const CHUNK_SIZE: i32 = 512 * 1024;

fn input_location(file: &TGFile) -> tl::enums::InputFileLocation {
    let FileLocation {
        media_id,
        access_hash,
        file_reference,
        thumb_size,
    } = &file.location;

    match file.kind {
        MediaKind::Photo => tl::types::InputPhotoFileLocation {
            id: *media_id,
            access_hash: *access_hash,
            file_reference: file_reference.clone(),
            thumb_size: thumb_size.clone(),
        }
        .into(),
        MediaKind::Video | MediaKind::Document => tl::types::InputDocumentFileLocation {
            id: *media_id,
            access_hash: *access_hash,
            file_reference: file_reference.clone(),
            thumb_size: String::new(),
        }
        .into(),
    }
}

/// 基于 upload.getFile 的媒体源实现
pub struct TgMediaSource {
    client: TgClient,
}

impl TgMediaSource {
    pub fn new(client: TgClient) -> Arc<Self> {
        Arc::new(Self { client })
    }

    async fn fetch_chunk(
        &self,
        location: &tl::enums::InputFileLocation,
        offset: i64,
    ) -> Result<Vec<u8>> {
        let file = self
            .client
            .client()
            .invoke(&tl::functions::upload::GetFile {
                precise: true,
                cdn_supported: false,
                location: location.clone(),
                offset,
                limit: CHUNK_SIZE,
            })
            .await
            .context("下载分片失败")?;

        match file {
            tl::enums::upload::File::File(f) => Ok(f.bytes),
            tl::enums::upload::File::CdnRedirect(_) => {
                anyhow::bail!("不支持的 CDN 重定向响应")
            }
        }
    }
}

#[async_trait]
impl MediaSource for TgMediaSource {
    async fn open_stream(
        &self,
        file: &TGFile,
    ) -> Result<Box<dyn AsyncRead + Send + Unpin>> {
        let location = input_location(file);
        let source = Self {
            client: self.client.clone(),
        };

        // 后台拉分片, 经通道交给读取侧; 通道容量即预读深度
        let (sender, receiver) = mpsc::channel::<std::io::Result<Vec<u8>>>(4);
        tokio::spawn(async move {
            let mut offset: i64 = 0;
            loop {
                match source.fetch_chunk(&location, offset).await {
                    Ok(bytes) => {
                        let len = bytes.len();
                        if len == 0 {
                            break;
                        }
                        offset += len as i64;
                        if sender.send(Ok(bytes)).await.is_err() {
                            debug!("下载流读取侧已关闭, 停止拉取");
                            break;
                        }
                        if len < CHUNK_SIZE as usize {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = sender
                            .send(Err(std::io::Error::other(e.to_string())))
                            .await;
                        break;
                    }
                }
            }
        });

        Ok(Box::new(ChunkReader::new(receiver)))
    }

    async fn download_to_file(
        &self,
        file: &TGFile,
        dest: &Path,
        counter: Arc<AtomicI64>,
    ) -> Result<()> {
        let location = input_location(file);
        let mut out = tokio::fs::File::create(dest)
            .await
            .with_context(|| format!("创建缓存文件失败: {:?}", dest))?;

        let mut offset: i64 = 0;
        loop {
            let bytes = self.fetch_chunk(&location, offset).await?;
            if bytes.is_empty() {
                break;
            }
            out.write_all(&bytes).await?;
            offset += bytes.len() as i64;
            counter.fetch_add(bytes.len() as i64, Ordering::Relaxed);
            if bytes.len() < CHUNK_SIZE as usize {
                break;
            }
        }

        out.flush().await?;
        debug!("缓存下载完成: {:?} ({} 字节)", dest, offset);
        Ok(())
    }
}

/// 把分片通道适配成 AsyncRead
pub struct ChunkReader {
    receiver: mpsc::Receiver<std::io::Result<Vec<u8>>>,
    current: Vec<u8>,
    pos: usize,
}

impl ChunkReader {
    pub fn new(receiver: mpsc::Receiver<std::io::Result<Vec<u8>>>) -> Self {
        Self {
            receiver,
            current: Vec::new(),
            pos: 0,
        }
    }
}

impl AsyncRead for ChunkReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();

        loop {
            if this.pos < this.current.len() {
                let available = &this.current[this.pos..];
                let n = available.len().min(buf.remaining());
                buf.put_slice(&available[..n]);
                this.pos += n;
                return Poll::Ready(Ok(()));
            }

            match this.receiver.poll_recv(cx) {
                Poll::Ready(Some(Ok(chunk))) => {
                    this.current = chunk;
                    this.pos = 0;
                }
                Poll::Ready(Some(Err(e))) => return Poll::Ready(Err(e)),
                Poll::Ready(None) => return Poll::Ready(Ok(())),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_chunk_reader_concatenates() {
        let (sender, receiver) = mpsc::channel(4);
        sender.send(Ok(vec![1, 2, 3])).await.unwrap();
        sender.send(Ok(vec![4, 5])).await.unwrap();
        drop(sender);

        let mut reader = ChunkReader::new(receiver);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_chunk_reader_propagates_error() {
        let (sender, receiver) = mpsc::channel(4);
        sender.send(Ok(vec![9])).await.unwrap();
        sender
            .send(Err(std::io::Error::other("连接中断")))
            .await
            .unwrap();
        drop(sender);

        let mut reader = ChunkReader::new(receiver);
        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).await.unwrap_err();
        assert!(err.to_string().contains("连接中断"));
    }
}
