// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::frame::{Frame, MAX_FRAME_LEN};
use bytes::{Bytes, BytesMut};
use std::io::{self, Read, Write};
use std::sync::mpsc;
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

/// 传输错误类型
#[derive(Error, Debug)]
pub enum TransportError {
    /// I/O错误
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// 编码错误
    #[error("Encode error: {0}")]
    Encode(#[from] serde_json::Error),

    /// 帧长度超过上限
    #[error("Frame of {0} bytes exceeds limit")]
    FrameTooLarge(usize),

    /// 对端已关闭
    #[error("Peer closed")]
    Closed,
}

/// 阻塞式帧发送端
pub trait FrameSink: Send {
    /// 发送一帧
    fn send(&mut self, frame: &Frame) -> Result<(), TransportError>;
}

/// 阻塞式帧接收端
pub trait FrameSource: Send {
    /// 接收下一帧
    ///
    /// # 返回值
    ///
    /// * `Ok(Some(Frame))` - 下一帧，无法解码的内容会被跳过
    /// * `Ok(None)` - 对端已关闭
    /// * `Err(TransportError)` - 读取失败
    fn recv(&mut self) -> Result<Option<Frame>, TransportError>;
}

impl<T: FrameSink + ?Sized> FrameSink for Box<T> {
    fn send(&mut self, frame: &Frame) -> Result<(), TransportError> {
        (**self).send(frame)
    }
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn recv(&mut self) -> Result<Option<Frame>, TransportError> {
        (**self).recv()
    }
}

/// 长度前缀编解码器：4字节大端长度加正文，正文上限为 [`MAX_FRAME_LEN`]
fn frame_codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(4)
        .big_endian()
        .max_frame_length(MAX_FRAME_LEN)
        .new_codec()
}

const READ_CHUNK: usize = 8 * 1024;

/// 基于字节流的发送端，每帧为4字节大端长度前缀加JSON正文
pub struct StreamSink<W> {
    writer: W,
    codec: LengthDelimitedCodec,
    buffer: BytesMut,
}

impl<W: Write + Send> StreamSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            codec: frame_codec(),
            buffer: BytesMut::new(),
        }
    }
}

impl<W: Write + Send> FrameSink for StreamSink<W> {
    fn send(&mut self, frame: &Frame) -> Result<(), TransportError> {
        let body = frame.encode()?;
        if body.len() > MAX_FRAME_LEN {
            return Err(TransportError::FrameTooLarge(body.len()));
        }
        self.buffer.clear();
        self.codec.encode(Bytes::from(body), &mut self.buffer)?;
        self.writer.write_all(&self.buffer)?;
        self.writer.flush()?;
        Ok(())
    }
}

/// 基于字节流的接收端
///
/// 流在帧中途结束时视为对端关闭，残缺的帧被丢弃。
pub struct StreamSource<R> {
    reader: R,
    codec: LengthDelimitedCodec,
    buffer: BytesMut,
}

impl<R: Read + Send> StreamSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            codec: frame_codec(),
            buffer: BytesMut::with_capacity(READ_CHUNK),
        }
    }

    /// 从缓冲区头部读出声明的帧长度
    fn declared_len(&self) -> usize {
        match self.buffer.get(..4) {
            Some(&[a, b, c, d]) => u32::from_be_bytes([a, b, c, d]) as usize,
            _ => 0,
        }
    }

    /// 再读入一段字节，流结束时返回 `false`
    fn fill(&mut self) -> Result<bool, TransportError> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.reader.read(&mut chunk) {
                Ok(0) => return Ok(false),
                Ok(n) => {
                    self.buffer.extend_from_slice(&chunk[..n]);
                    return Ok(true);
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }
    }
}

impl<R: Read + Send> FrameSource for StreamSource<R> {
    fn recv(&mut self) -> Result<Option<Frame>, TransportError> {
        loop {
            let declared = self.declared_len();
            match self.codec.decode(&mut self.buffer) {
                Ok(Some(body)) => {
                    if let Some(frame) = Frame::decode(&body) {
                        return Ok(Some(frame));
                    }
                }
                Ok(None) => {
                    if !self.fill()? {
                        return Ok(None);
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::InvalidData => {
                    return Err(TransportError::FrameTooLarge(declared));
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

/// 进程内的帧发送端，用于测试与单进程运行
pub struct ChannelSink {
    tx: mpsc::Sender<Vec<u8>>,
}

impl ChannelSink {
    /// 发送任意字节，模拟通道上的噪声
    pub fn send_raw(&mut self, bytes: Vec<u8>) -> Result<(), TransportError> {
        self.tx.send(bytes).map_err(|_| TransportError::Closed)
    }
}

impl FrameSink for ChannelSink {
    fn send(&mut self, frame: &Frame) -> Result<(), TransportError> {
        let body = frame.encode()?;
        self.send_raw(body)
    }
}

/// 进程内的帧接收端
pub struct ChannelSource {
    rx: mpsc::Receiver<Vec<u8>>,
}

impl FrameSource for ChannelSource {
    fn recv(&mut self) -> Result<Option<Frame>, TransportError> {
        while let Ok(bytes) = self.rx.recv() {
            if let Some(frame) = Frame::decode(&bytes) {
                return Ok(Some(frame));
            }
        }
        Ok(None)
    }
}

/// 创建一对进程内的单向帧通道
pub fn channel() -> (ChannelSink, ChannelSource) {
    let (tx, rx) = mpsc::channel();
    (ChannelSink { tx }, ChannelSource { rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::package::Package;
    use serde_json::json;
    use std::io::Cursor;

    fn package(order: usize) -> Frame {
        Frame::Package(Package::new("books", order, vec![json!(order)], None))
    }

    #[test]
    fn test_stream_round_trip_is_fifo() {
        let mut sink = StreamSink::new(Vec::new());
        for order in 0..3 {
            sink.send(&package(order)).unwrap();
        }

        let mut source = StreamSource::new(Cursor::new(sink.writer));
        for order in 0..3 {
            assert_eq!(source.recv().unwrap(), Some(package(order)));
        }
        assert_eq!(source.recv().unwrap(), None);
    }

    #[test]
    fn test_stream_skips_noise_between_frames() {
        let mut bytes = Vec::new();
        let noise = b"garbage";
        bytes.extend_from_slice(&(noise.len() as u32).to_be_bytes());
        bytes.extend_from_slice(noise);
        let mut sink = StreamSink::new(bytes);
        sink.send(&package(7)).unwrap();

        let mut source = StreamSource::new(Cursor::new(sink.writer));
        assert_eq!(source.recv().unwrap(), Some(package(7)));
    }

    #[test]
    fn test_truncated_stream_ends_cleanly() {
        let mut sink = StreamSink::new(Vec::new());
        sink.send(&package(1)).unwrap();
        let mut bytes = sink.writer;
        bytes.truncate(bytes.len() - 2);

        let mut source = StreamSource::new(Cursor::new(bytes));
        assert_eq!(source.recv().unwrap(), None);
    }

    /// 每次最多读出一个字节的读端
    struct Trickle(Cursor<Vec<u8>>);

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let end = buf.len().min(1);
            self.0.read(&mut buf[..end])
        }
    }

    #[test]
    fn test_frames_split_across_reads_are_reassembled() {
        let mut sink = StreamSink::new(Vec::new());
        sink.send(&package(3)).unwrap();
        sink.send(&package(4)).unwrap();

        let mut source = StreamSource::new(Trickle(Cursor::new(sink.writer)));
        assert_eq!(source.recv().unwrap(), Some(package(3)));
        assert_eq!(source.recv().unwrap(), Some(package(4)));
        assert_eq!(source.recv().unwrap(), None);
    }

    #[test]
    fn test_header_is_four_byte_big_endian_length() {
        let mut sink = StreamSink::new(Vec::new());
        sink.send(&package(5)).unwrap();

        let body = package(5).encode().unwrap();
        assert_eq!(&sink.writer[..4], &(body.len() as u32).to_be_bytes());
        assert_eq!(&sink.writer[4..], body.as_slice());
    }

    #[test]
    fn test_oversized_length_is_rejected() {
        let header = ((MAX_FRAME_LEN + 1) as u32).to_be_bytes().to_vec();
        let mut source = StreamSource::new(Cursor::new(header));
        assert!(matches!(
            source.recv(),
            Err(TransportError::FrameTooLarge(_))
        ));
    }

    #[test]
    fn test_channel_drops_noise_and_reports_close() {
        let (mut sink, mut source) = channel();
        sink.send_raw(b"{}".to_vec()).unwrap();
        sink.send(&package(2)).unwrap();
        drop(sink);

        assert_eq!(source.recv().unwrap(), Some(package(2)));
        assert_eq!(source.recv().unwrap(), None);
    }
}
