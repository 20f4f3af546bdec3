use std::io::{Read, Write};

use crate::error::{Result, TraceError};

pub trait WriteLeExt: Write {
    fn write_u64_le(&mut self, v: u64) -> Result<()> {
        self.write_all(&v.to_le_bytes())?;
        Ok(())
    }

    /// Write a `u64` byte length followed by the bytes themselves.
    fn write_len_prefixed_bytes_u64(&mut self, bytes: &[u8]) -> Result<()> {
        let len: u64 = bytes
            .len()
            .try_into()
            .map_err(|_| TraceError::Corrupt("length does not fit in u64"))?;
        self.write_u64_le(len)?;
        self.write_all(bytes)?;
        Ok(())
    }
}

impl<T: Write + ?Sized> WriteLeExt for T {}

pub trait ReadLeExt: Read {
    fn read_u64_le(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    fn read_exact_vec(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(len)
            .map_err(|_| TraceError::OutOfMemory { len })?;
        buf.resize(len, 0);
        self.read_exact(&mut buf)?;
        Ok(buf)
    }
}

impl<T: Read + ?Sized> ReadLeExt for T {}
