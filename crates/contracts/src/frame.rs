//! RawFrame / FrameSource - 帧源接口
//!
//! 帧源在自己的采集线程中调用回调，传入一个借用的原始深度缓冲区。
//! 回调签名中的生命周期保证处理器无法在回调返回后持有该缓冲区，
//! 帧源可以在下一帧复用同一块内存。

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::ContractError;

/// 原始值上限：>= 该值表示无回波
pub const NO_RETURN_RAW: u16 = 2047;

/// 设备深度格式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DepthFormat {
    /// 11 bit 深度，每像素一个小端 u16
    #[default]
    #[serde(rename = "d11_bit")]
    D11Bit,
    /// 10 bit 深度，每像素一个小端 u16
    #[serde(rename = "d10_bit")]
    D10Bit,
    /// 11 bit 深度，大端紧凑位流
    #[serde(rename = "d11_bit_packed")]
    D11BitPacked,
    /// 10 bit 深度，大端紧凑位流
    #[serde(rename = "d10_bit_packed")]
    D10BitPacked,
}

impl DepthFormat {
    /// 每个样本的有效位数
    pub fn bits_per_sample(self) -> u32 {
        match self {
            Self::D11Bit | Self::D11BitPacked => 11,
            Self::D10Bit | Self::D10BitPacked => 10,
        }
    }

    pub fn is_packed(self) -> bool {
        matches!(self, Self::D11BitPacked | Self::D10BitPacked)
    }

    /// 存放 `cells` 个样本所需的字节数
    pub fn required_bytes(self, cells: usize) -> usize {
        if self.is_packed() {
            (cells * self.bits_per_sample() as usize).div_ceil(8)
        } else {
            cells * 2
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::D11Bit => "d11_bit",
            Self::D10Bit => "d10_bit",
            Self::D11BitPacked => "d11_bit_packed",
            Self::D10BitPacked => "d10_bit_packed",
        }
    }
}

impl std::fmt::Display for DepthFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 帧模式：分辨率 + 深度格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameMode {
    pub width: u32,
    pub height: u32,
    pub format: DepthFormat,
}

impl FrameMode {
    pub fn new(width: u32, height: u32, format: DepthFormat) -> Self {
        Self {
            width,
            height,
            format,
        }
    }

    /// 像素数
    pub fn cells(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// 一帧完整缓冲区的字节数
    pub fn frame_len(&self) -> usize {
        self.format.required_bytes(self.cells())
    }
}

/// 单帧的借用视图
///
/// 行主序，`width * height` 个样本。只在一次回调内有效。
#[derive(Debug, Clone, Copy)]
pub struct RawFrame<'a> {
    mode: FrameMode,
    data: &'a [u8],
    /// 设备侧时间戳提示 (毫秒)，处理器不依赖它
    timestamp_hint: u64,
}

impl<'a> RawFrame<'a> {
    pub fn new(mode: FrameMode, data: &'a [u8], timestamp_hint: u64) -> Self {
        Self {
            mode,
            data,
            timestamp_hint,
        }
    }

    pub fn mode(&self) -> FrameMode {
        self.mode
    }

    pub fn width(&self) -> u32 {
        self.mode.width
    }

    pub fn height(&self) -> u32 {
        self.mode.height
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn timestamp_hint(&self) -> u64 {
        self.timestamp_hint
    }

    /// 缓冲区长度是否足以容纳整帧
    pub fn is_complete(&self) -> bool {
        self.data.len() >= self.mode.frame_len()
    }

    /// 解码第 `index` 个样本 (行主序下标 `x + y * width`)
    ///
    /// 下标越界或缓冲区不足时返回 `None`。
    #[inline]
    pub fn sample_at(&self, index: usize) -> Option<u16> {
        let format = self.mode.format;
        if format.is_packed() {
            unpack_bits(self.data, index, format.bits_per_sample())
        } else {
            let offset = index.checked_mul(2)?;
            let bytes = self.data.get(offset..offset + 2)?;
            Some(u16::from_le_bytes([bytes[0], bytes[1]]))
        }
    }
}

/// 从大端位流中取出第 `index` 个 `bits` 位样本
fn unpack_bits(data: &[u8], index: usize, bits: u32) -> Option<u16> {
    let bit_start = index.checked_mul(bits as usize)?;
    let first = bit_start / 8;
    let last = (bit_start + bits as usize - 1) / 8;
    let window = data.get(first..=last)?;

    let mut acc: u32 = 0;
    for &byte in window {
        acc = (acc << 8) | byte as u32;
    }
    let total_bits = window.len() as u32 * 8;
    let shift = total_bits - (bit_start % 8) as u32 - bits;
    let mask = (1u32 << bits) - 1;
    Some(((acc >> shift) & mask) as u16)
}

/// 按给定格式把样本写入 `out` (先清空)
///
/// 帧源用它复用同一块缓冲区；超出位宽的高位被截掉。
pub fn pack_samples_into<I>(format: DepthFormat, samples: I, out: &mut Vec<u8>)
where
    I: IntoIterator<Item = u16>,
{
    out.clear();
    if !format.is_packed() {
        for sample in samples {
            out.extend_from_slice(&sample.to_le_bytes());
        }
        return;
    }

    let bits = format.bits_per_sample();
    let mask = (1u64 << bits) - 1;
    let mut acc: u64 = 0;
    let mut pending: u32 = 0;
    for sample in samples {
        acc = (acc << bits) | (sample as u64 & mask);
        pending += bits;
        while pending >= 8 {
            pending -= 8;
            out.push((acc >> pending) as u8);
        }
        acc &= (1u64 << pending) - 1;
    }
    if pending > 0 {
        out.push((acc << (8 - pending)) as u8);
    }
}

/// 按给定格式编码样本
pub fn pack_samples(format: DepthFormat, samples: &[u16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(format.required_bytes(samples.len()));
    pack_samples_into(format, samples.iter().copied(), &mut out);
    out
}

/// 帧回调类型
pub type FrameCallback = Arc<dyn for<'a> Fn(RawFrame<'a>) + Send + Sync>;

/// 深度帧源
///
/// 抽象真实设备、合成帧源和回放帧源的共同行为。
pub trait FrameSource: Send + Sync {
    /// 源标识
    fn source_id(&self) -> &str;

    /// 设置深度模式 (分辨率 + 格式)
    ///
    /// 设备不支持该模式时返回错误，状态不变。
    fn set_depth_format(&self, mode: FrameMode) -> Result<(), ContractError>;

    /// 注册回调并开始采集
    ///
    /// 已在采集时重复调用是幂等的，不会注册第二个回调。
    fn start_capture(&self, callback: FrameCallback) -> Result<(), ContractError>;

    /// 停止采集并注销回调
    fn stop(&self);

    fn is_capturing(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unpacked_little_endian() {
        let mode = FrameMode::new(2, 1, DepthFormat::D11Bit);
        let data = [0xF4, 0x01, 0xFF, 0x07];
        let frame = RawFrame::new(mode, &data, 0);
        assert!(frame.is_complete());
        assert_eq!(frame.sample_at(0), Some(500));
        assert_eq!(frame.sample_at(1), Some(2047));
        assert_eq!(frame.sample_at(2), None);
    }

    #[test]
    fn packed_eleven_bit_known_bytes() {
        // 0b10000000000, 0b00000000001
        let data = [0x80, 0x00, 0x04];
        let mode = FrameMode::new(2, 1, DepthFormat::D11BitPacked);
        let frame = RawFrame::new(mode, &data, 0);
        assert_eq!(mode.frame_len(), 3);
        assert_eq!(frame.sample_at(0), Some(0x400));
        assert_eq!(frame.sample_at(1), Some(0x001));
    }

    #[test]
    fn packed_layouts_decode_what_was_packed() {
        let samples: Vec<u16> = vec![0, 1, 500, 1023, 77, 512, 3, 1000, 999];
        for format in [DepthFormat::D10BitPacked, DepthFormat::D11BitPacked] {
            let data = pack_samples(format, &samples);
            assert_eq!(data.len(), format.required_bytes(samples.len()));
            let mode = FrameMode::new(3, 3, format);
            let frame = RawFrame::new(mode, &data, 0);
            let decoded: Vec<u16> = (0..9).filter_map(|i| frame.sample_at(i)).collect();
            assert_eq!(decoded, samples, "{format}");
        }
    }

    #[test]
    fn truncated_buffer_is_incomplete() {
        let mode = FrameMode::new(4, 2, DepthFormat::D11Bit);
        let data = vec![0u8; 10];
        let frame = RawFrame::new(mode, &data, 0);
        assert!(!frame.is_complete());
        assert_eq!(frame.sample_at(4), Some(0));
        assert_eq!(frame.sample_at(5), None);
    }

    #[test]
    fn pack_into_reuses_buffer() {
        let mut buf = Vec::with_capacity(16);
        pack_samples_into(DepthFormat::D10Bit, [1u16, 2, 3], &mut buf);
        let ptr = buf.as_ptr();
        pack_samples_into(DepthFormat::D10Bit, [4u16, 5, 6], &mut buf);
        assert_eq!(buf.as_ptr(), ptr);
        assert_eq!(buf, vec![4, 0, 5, 0, 6, 0]);
    }

    #[test]
    fn depth_format_names() {
        let parsed: DepthFormat = serde_json::from_str("\"d10_bit_packed\"").unwrap();
        assert_eq!(parsed, DepthFormat::D10BitPacked);
        assert_eq!(DepthFormat::default().to_string(), "d11_bit");
    }
}
