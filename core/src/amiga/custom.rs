//! Custom chip register offsets (relative to $DFF000)

#![allow(dead_code)]

use crate::types::Word;

pub const DMACONR: Word = 0x002;
pub const VPOSR: Word = 0x004;
pub const VHPOSR: Word = 0x006;
pub const DSKPTH: Word = 0x020;
pub const DSKPTL: Word = 0x022;
pub const COPCON: Word = 0x02E;
pub const BLTSIZE: Word = 0x058;
pub const COP1LCH: Word = 0x080;
pub const COP1LCL: Word = 0x082;
pub const COP2LCH: Word = 0x084;
pub const COP2LCL: Word = 0x086;
pub const COPJMP1: Word = 0x088;
pub const COPJMP2: Word = 0x08A;
pub const COPINS: Word = 0x08C;
pub const DIWSTRT: Word = 0x08E;
pub const DIWSTOP: Word = 0x090;
pub const DDFSTRT: Word = 0x092;
pub const DDFSTOP: Word = 0x094;
pub const DMACON: Word = 0x096;
pub const AUD0LCH: Word = 0x0A0;
pub const AUD3LEN: Word = 0x0D4;
pub const BPL1PTH: Word = 0x0E0;
pub const BPL1PTL: Word = 0x0E2;
pub const BPL6PTL: Word = 0x0F6;
pub const BPLCON0: Word = 0x100;
pub const BPL1MOD: Word = 0x108;
pub const BPL2MOD: Word = 0x10A;
pub const SPR0PTH: Word = 0x120;
pub const SPR7PTL: Word = 0x13E;
pub const COLOR00: Word = 0x180;
pub const COLOR01: Word = 0x182;
pub const COLOR02: Word = 0x184;
pub const COLOR31: Word = 0x1BE;

/// Returns true for the colour palette registers
pub const fn is_color_reg(reg: Word) -> bool {
    reg >= COLOR00 && reg <= COLOR31
}

/// Register mnemonic, for debugging views
pub fn reg_name(reg: Word) -> String {
    match reg & 0x1FE {
        DMACONR => "DMACONR".to_string(),
        VPOSR => "VPOSR".to_string(),
        VHPOSR => "VHPOSR".to_string(),
        DSKPTH => "DSKPTH".to_string(),
        DSKPTL => "DSKPTL".to_string(),
        COPCON => "COPCON".to_string(),
        BLTSIZE => "BLTSIZE".to_string(),
        COP1LCH => "COP1LCH".to_string(),
        COP1LCL => "COP1LCL".to_string(),
        COP2LCH => "COP2LCH".to_string(),
        COP2LCL => "COP2LCL".to_string(),
        COPJMP1 => "COPJMP1".to_string(),
        COPJMP2 => "COPJMP2".to_string(),
        COPINS => "COPINS".to_string(),
        DIWSTRT => "DIWSTRT".to_string(),
        DIWSTOP => "DIWSTOP".to_string(),
        DDFSTRT => "DDFSTRT".to_string(),
        DDFSTOP => "DDFSTOP".to_string(),
        DMACON => "DMACON".to_string(),
        BPLCON0 => "BPLCON0".to_string(),
        BPL1MOD => "BPL1MOD".to_string(),
        BPL2MOD => "BPL2MOD".to_string(),
        r @ AUD0LCH..=AUD3LEN => {
            let ch = (r - AUD0LCH) / 0x10;
            match (r - AUD0LCH) % 0x10 {
                0 => format!("AUD{}LCH", ch),
                2 => format!("AUD{}LCL", ch),
                4 => format!("AUD{}LEN", ch),
                _ => format!("AUD{}_{:02X}", ch, (r - AUD0LCH) % 0x10),
            }
        }
        r @ BPL1PTH..=BPL6PTL => {
            let hl = if r & 2 == 0 { 'H' } else { 'L' };
            format!("BPL{}PT{}", (r - BPL1PTH) / 4 + 1, hl)
        }
        r @ SPR0PTH..=SPR7PTL => {
            let hl = if r & 2 == 0 { 'H' } else { 'L' };
            format!("SPR{}PT{}", (r - SPR0PTH) / 4, hl)
        }
        r @ COLOR00..=COLOR31 => format!("COLOR{:02}", (r - COLOR00) / 2),
        r => format!("${:03X}", r),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names() {
        assert_eq!(reg_name(0x180), "COLOR00");
        assert_eq!(reg_name(0x1BE), "COLOR31");
        assert_eq!(reg_name(0x0E6), "BPL2PTL");
        assert_eq!(reg_name(0x13C), "SPR7PTH");
        assert_eq!(reg_name(0x0B4), "AUD1LEN");
        assert_eq!(reg_name(0x096), "DMACON");
        assert_eq!(reg_name(0x1FE), "$1FE");
    }

    #[test]
    fn colors() {
        assert!(is_color_reg(0x180));
        assert!(is_color_reg(0x1BE));
        assert!(!is_color_reg(0x1C0));
        assert!(!is_color_reg(0x17E));
    }
}
