//! NDJSON 分行
//!
//! 上游按任意边界切块，行可能跨块、UTF-8 字符也可能被切断，因此按字节缓存到换行符再解码

/// 跨块行缓冲
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入一个数据块，返回其中所有完整的非空行
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(pos) = self.buf[start..].iter().position(|&b| b == b'\n') {
            let end = start + pos;
            if let Some(line) = decode_line(&self.buf[start..end]) {
                lines.push(line);
            }
            start = end + 1;
        }
        self.buf.drain(..start);
        lines
    }

    /// 流结束时取出最后一行（没有结尾换行符的情况）
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buf);
        decode_line(&rest)
    }
}

fn decode_line(raw: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim();
    if line.is_empty() {
        None
    } else {
        Some(line.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_split_across_chunks() {
        let mut buf = LineBuffer::new();
        assert!(buf.push(br#"{"status":"pull"#).is_empty());
        assert_eq!(buf.push(b"ing manifest\"}\n{\"a\":1}\n{\"b\""), vec![
            r#"{"status":"pulling manifest"}"#.to_string(),
            r#"{"a":1}"#.to_string(),
        ]);
        assert_eq!(buf.push(b":2}\n"), vec![r#"{"b":2}"#.to_string()]);
        assert_eq!(buf.finish(), None);
    }

    #[test]
    fn test_blank_and_crlf_lines() {
        let mut buf = LineBuffer::new();
        let lines = buf.push(b"\n\r\n{\"a\":1}\r\n   \n");
        assert_eq!(lines, vec![r#"{"a":1}"#.to_string()]);
    }

    #[test]
    fn test_finish_flushes_unterminated_line() {
        let mut buf = LineBuffer::new();
        assert!(buf.push(br#"{"done":true}"#).is_empty());
        assert_eq!(buf.finish().as_deref(), Some(r#"{"done":true}"#));
        assert_eq!(buf.finish(), None);
    }

    #[test]
    fn test_multibyte_char_split_between_chunks() {
        let text = "{\"response\":\"你好\"}\n".as_bytes();
        // 在“你”的中间切开
        let (a, b) = text.split_at(15);
        let mut buf = LineBuffer::new();
        assert!(buf.push(a).is_empty());
        assert_eq!(buf.push(b), vec!["{\"response\":\"你好\"}".to_string()]);
    }
}
