use crate::compression::arithmetic_coder::{BitReader, BitWriter};
use crate::compression::quantizer::MAX_QINDEX;
use crate::compression::subband::Subband;
use crate::error::{CodecError, CodecResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub skipped: bool,
    pub qindex: usize,
}

/// Per-band side information: skip flag, quantiser choice and, for
/// partitioned bands, the per-block skip flags and quantiser deltas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubbandHeader {
    pub skipped: bool,
    pub qindex: usize,
    pub multi_quants: bool,
    pub blocks: Vec<BlockHeader>,
}

impl SubbandHeader {
    pub fn from_band(band: &Subband) -> Self {
        Self {
            skipped: band.skipped,
            qindex: band.qindex,
            multi_quants: band.multi_quants,
            blocks: band
                .blocks()
                .iter()
                .map(|b| BlockHeader {
                    skipped: b.skipped,
                    qindex: if band.multi_quants { b.qindex } else { band.qindex },
                })
                .collect(),
        }
    }

    /// Copies the header onto a band whose code-block layout is already set.
    pub fn apply(&self, band: &mut Subband) -> CodecResult<()> {
        band.skipped = self.skipped;
        band.multi_quants = self.multi_quants;
        band.set_qindex(self.qindex);
        if self.skipped {
            return Ok(());
        }
        if self.blocks.len() != band.blocks().len() {
            return Err(CodecError::Malformed(format!(
                "header carries {} code blocks, band has {}",
                self.blocks.len(),
                band.blocks().len()
            )));
        }
        for (block, info) in band.blocks_mut().iter_mut().zip(&self.blocks) {
            block.skipped = info.skipped;
            block.qindex = info.qindex;
        }
        Ok(())
    }

    pub fn write(&self, writer: &mut BitWriter) {
        writer.write_bit(self.skipped);
        if self.skipped {
            return;
        }
        writer.write_exp_golomb(self.qindex as u32);

        if self.blocks.len() > 1 {
            writer.write_bit(self.multi_quants);
            let mut last = self.qindex as i32;
            for block in &self.blocks {
                writer.write_bit(block.skipped);
                if self.multi_quants && !block.skipped {
                    writer.write_signed_exp_golomb(block.qindex as i32 - last);
                    last = block.qindex as i32;
                }
            }
        }
    }

    /// Reads a header for a band partitioned into `num_blocks` blocks.
    pub fn read(reader: &mut BitReader, num_blocks: usize) -> CodecResult<Self> {
        let skipped = reader.read_bit()?;
        if skipped {
            return Ok(Self {
                skipped,
                qindex: 0,
                multi_quants: false,
                blocks: Vec::new(),
            });
        }
        let qindex = check_qindex(reader.read_exp_golomb()? as i64)?;

        let mut multi_quants = false;
        let mut blocks = vec![
            BlockHeader {
                skipped: false,
                qindex,
            };
            num_blocks
        ];
        if num_blocks > 1 {
            multi_quants = reader.read_bit()?;
            let mut last = qindex;
            for block in &mut blocks {
                block.skipped = reader.read_bit()?;
                if multi_quants && !block.skipped {
                    let delta = reader.read_signed_exp_golomb()?;
                    last = check_qindex(last as i64 + delta as i64)?;
                    block.qindex = last;
                }
            }
        }

        Ok(Self {
            skipped,
            qindex,
            multi_quants,
            blocks,
        })
    }
}

fn check_qindex(q: i64) -> CodecResult<usize> {
    if (0..=MAX_QINDEX as i64).contains(&q) {
        Ok(q as usize)
    } else {
        Err(CodecError::Malformed(format!(
            "quantiser index {} outside 0..={}",
            q, MAX_QINDEX
        )))
    }
}
