use super::{SysExError, EOX};

/// Byte cursor over one SysEx frame.
#[derive(Debug, Clone)]
pub struct SysExReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> SysExReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.position..]
    }

    pub fn is_empty(&self) -> bool {
        self.position >= self.data.len()
    }

    pub fn peek(&self) -> Option<u8> {
        self.data.get(self.position).copied()
    }

    pub fn next(&mut self) -> Result<u8, SysExError> {
        let byte = self.peek().ok_or(SysExError::UnexpectedEnd(self.position))?;
        self.position += 1;
        Ok(byte)
    }

    pub fn expect(&mut self, expected: u8) -> Result<(), SysExError> {
        let position = self.position;
        match self.next()? {
            received if received == expected => Ok(()),
            received => Err(SysExError::MalformedFrame {
                position,
                expected,
                received,
            }),
        }
    }

    pub fn take(&mut self, len: usize) -> Result<&'a [u8], SysExError> {
        let end = self.position + len;
        if end > self.data.len() {
            return Err(SysExError::UnexpectedEnd(self.data.len()));
        }
        let slice = &self.data[self.position..end];
        self.position = end;
        Ok(slice)
    }

    pub fn take_array<const N: usize>(&mut self) -> Result<[u8; N], SysExError> {
        let mut array = [0; N];
        array.copy_from_slice(self.take(N)?);
        Ok(array)
    }

    /// Skips up to `max` padding zeros.
    pub fn skip_zeros(&mut self, max: usize) -> usize {
        let count = self
            .remaining()
            .iter()
            .take(max)
            .take_while(|byte| **byte == 0)
            .count();
        self.position += count;
        count
    }

    /// Returns everything up to the closing `F7` and moves past it.
    pub fn take_until_eox(&mut self) -> Result<&'a [u8], SysExError> {
        let len = self
            .remaining()
            .iter()
            .position(|byte| *byte == EOX)
            .ok_or(SysExError::UnexpectedEnd(self.data.len()))?;
        let body = self.take(len)?;
        self.position += 1;
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;

    #[test]
    fn cursor() {
        let frame = hex!("F0 41 00 00 12 01 02 F7");
        let mut reader = SysExReader::new(&frame);
        reader.expect(0xF0).unwrap();
        assert_eq!(reader.next().unwrap(), 0x41);
        assert_eq!(reader.skip_zeros(3), 2);
        assert_eq!(reader.peek(), Some(0x12));
        assert_eq!(reader.take_array::<2>().unwrap(), [0x12, 0x01]);
        assert_eq!(reader.take_until_eox().unwrap(), &[0x02]);
        assert!(reader.is_empty());
        assert!(matches!(reader.next(), Err(SysExError::UnexpectedEnd(8))));
    }

    #[test]
    fn errors() {
        let frame = hex!("F0 41 02");
        let mut reader = SysExReader::new(&frame);
        assert!(matches!(
            reader.expect(0xF7),
            Err(SysExError::MalformedFrame {
                position: 0,
                expected: 0xF7,
                received: 0xF0
            })
        ));
        assert!(matches!(reader.take(3), Err(SysExError::UnexpectedEnd(3))));
        assert_eq!(reader.position(), 1);
        assert!(matches!(reader.take_until_eox(), Err(SysExError::UnexpectedEnd(3))));
    }
}
