use std::io::{Read, Seek};

use anyhow::{bail, Result};
use binrw::io::NoSeek;
use binrw::{binrw, BinRead, BinWrite, NullString};

use crate::amiga::chipset::Chipset;
use crate::bus::chipram::ChipRam;

#[binrw]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SaveCompression {
    #[brw(magic = 1u8)]
    None,
    #[brw(magic = 2u8)]
    Zstd,
}

#[binrw]
#[brw(little, magic = b"AGNUS")]
struct SaveHeader {
    /// Header/file version
    pub version: u16,
    /// Type of compression used
    pub compression: SaveCompression,
    /// Level of compression
    pub compression_level: u8,
    /// Crate version that wrote the state
    pub core_version: NullString,
    /// Chip RAM size in bytes
    pub chip_ram: u32,
}

const STATE_VERSION: u16 = 2;
const END_OF_CHUNK: &[u8] = b"EOFC";

/// Writes a save state of the chipset and chip RAM to the given writer
pub fn save_state_to<W: std::io::Write + Seek>(mut writer: W, chipset: &Chipset<ChipRam>) -> Result<()> {
    let compression_level = 0; // library default

    let header = SaveHeader {
        version: STATE_VERSION,
        compression: SaveCompression::Zstd,
        compression_level,
        core_version: env!("CARGO_PKG_VERSION").into(),
        chip_ram: u32::try_from(chipset.mem.size())?,
    };
    header.write(&mut writer)?;

    let compressor =
        NoSeek::new(zstd::stream::Encoder::new(writer, compression_level.into())?.auto_finish());
    let mut compressor = postcard::to_io(chipset, compressor)?;
    END_OF_CHUNK.write(&mut compressor)?;

    Ok(())
}

/// Loads a chipset from a save state. The result is not attached to any
/// run loop control or inspection handle yet.
pub fn load_state_from<R: Read + Seek>(mut reader: R) -> Result<Chipset<ChipRam>> {
    let header = SaveHeader::read(&mut reader)?;

    if header.version != STATE_VERSION {
        bail!("Invalid state file version {}", header.version);
    }

    if header.compression != SaveCompression::Zstd {
        bail!("Unsupported compression method {:?}", header.compression);
    }

    let decompressor = NoSeek::new(zstd::stream::Decoder::new(reader)?);

    // TODO remove static buffer once postcard supports it, tracking issue:
    // https://github.com/jamesmunns/postcard/issues/162
    let mut buf = [0; 1024];
    let (chipset, (mut decompressor, _)) =
        postcard::from_io::<Chipset<ChipRam>, _>((decompressor, &mut buf))?;

    let mut eofcbuf = [0; END_OF_CHUNK.len()];
    decompressor.read_exact(&mut eofcbuf)?;
    if eofcbuf != END_OF_CHUNK {
        bail!("Expected end of chunk but did not find it");
    }

    if decompressor.bytes().next().is_some() {
        bail!("Expected EOF but found more data");
    }

    if chipset.mem.size() != header.chip_ram as usize {
        bail!(
            "Chip RAM size mismatch: header says {}, state has {}",
            header.chip_ram,
            chipset.mem.size()
        );
    }

    Ok(chipset)
}
