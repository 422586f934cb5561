//! MPEG2-TSにおける日付時刻。

use std::fmt::{self, Write};
use std::time::Duration;

use crate::utils::BytesExt;

fn write_hundreds<W: Write>(w: &mut W, n: u8) -> fmt::Result {
    let h = b'0' + n / 10;
    let l = b'0' + n % 10;
    w.write_char(h as char)?;
    w.write_char(l as char)
}

/// PCRに用いられる42ビットのタイムスタンプ。
///
/// 90kHzで駆動する33ビットのベース部と、27MHzで駆動する9ビットの拡張部からなる。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    base: u64,
    extension: u16,
}

impl Timestamp {
    /// `Timestamp`を生成する。
    ///
    /// # パニック
    ///
    /// `base`が33ビット、`extension`が9ビットの範囲を超える場合はパニックする。
    #[inline]
    pub const fn new(base: u64, extension: u16) -> Timestamp {
        assert!(base < 1 << 33);
        assert!(extension < 1 << 9);
        Timestamp { base, extension }
    }

    /// `data`からPCRを読み取る。
    pub fn read_pcr(data: &[u8; 6]) -> Timestamp {
        let base = (data[0] as u64) << 25
            | (data[1] as u64) << 17
            | (data[2] as u64) << 9
            | (data[3] as u64) << 1
            | (data[4] as u64) >> 7;
        let extension = ((data[4] & 0b1) as u16) << 8 | data[5] as u16;

        Timestamp { base, extension }
    }

    /// ベース部を返す。
    #[inline]
    pub const fn base(&self) -> u64 {
        self.base
    }

    /// 拡張部を返す。
    #[inline]
    pub const fn extension(&self) -> u16 {
        self.extension
    }

    /// タイムスタンプ全体を27MHz単位の値として返す。
    #[inline]
    pub const fn full(&self) -> u64 {
        self.base * 300 + self.extension as u64
    }

    /// タイムスタンプを[`Duration`]に変換する。
    ///
    /// 変換は整数演算のみで行われ、ナノ秒未満は切り捨てられる。
    #[inline]
    pub const fn to_duration(&self) -> Duration {
        Duration::from_nanos(self.full() * 1000 / 27)
    }
}

/// 修正ユリウス日。
#[derive(Clone, PartialEq, Eq)]
pub struct MjdDate {
    /// 1900年からの年（2003年＝103）。
    pub year: u16,
    /// 月（1月＝1、12月＝12）。
    pub month: u8,
    /// 日（1～31）。
    pub day: u8,
    /// 曜日（月曜日＝1、日曜日＝7）。
    pub day_of_week: u8,
}

impl MjdDate {
    /// `data`から`MjdDate`を読み取る。
    ///
    /// 変換はARIB STD-B10の換算式に従い、整数演算のみで行われる。
    pub fn read(data: &[u8; 2]) -> MjdDate {
        let mjd = data.read_be_16() as i64;

        // yd = (mjd - 15078.2) / 365.25
        let yd = (mjd * 10 - 150782) * 2 / 7305;
        // f = int(yd * 365.25)
        let f = yd * 1461 / 4;
        // md = (mjd - 14956.1 - f) / 30.6001
        let md = (mjd * 10 - 149561 - f * 10) * 1000 / 306001;

        let day = (mjd - 14956 - f - md * 306001 / 10000) as u8;
        let day_of_week = ((mjd + 2) % 7 + 1) as u8;
        let (year, month) = if md == 14 || md == 15 {
            ((yd + 1) as u16, (md - 1 - 12) as u8)
        } else {
            (yd as u16, (md - 1) as u8)
        };

        MjdDate {
            year,
            month,
            day,
            day_of_week,
        }
    }

    /// `data`から`MjdDate`を読み取る。未定義を表す全ビット1の場合は`None`を返す。
    pub fn read_opt(data: &[u8; 2]) -> Option<MjdDate> {
        if *data == [0xFF; 2] {
            None
        } else {
            Some(MjdDate::read(data))
        }
    }
}

impl fmt::Debug for MjdDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        (1900 + self.year).fmt(f)?;

        f.write_char('-')?;
        write_hundreds(f, self.month)?;

        f.write_char('-')?;
        write_hundreds(f, self.day)
    }
}

impl fmt::Display for MjdDate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// 修正ユリウス日と日本標準時からなる日付時刻。
#[derive(Clone, PartialEq, Eq)]
pub struct DateTime {
    /// 修正ユリウス日。
    pub date: MjdDate,
    /// 時（0～23）。
    pub hour: u8,
    /// 分（0～59）。
    pub minute: u8,
    /// 秒（0～60）。
    pub second: u8,
}

impl DateTime {
    /// `data`から`DateTime`を読み取る。
    pub fn read(data: &[u8; 5]) -> DateTime {
        let date = MjdDate::read(&data[0..=1].try_into().unwrap());

        let hour = crate::utils::read_bcd_digit(data[2]);
        let minute = crate::utils::read_bcd_digit(data[3]);
        let second = crate::utils::read_bcd_digit(data[4]);

        DateTime {
            date,
            hour,
            minute,
            second,
        }
    }

    /// `data`から`DateTime`を読み取る。未定義を表す全ビット1の場合は`None`を返す。
    pub fn read_opt(data: &[u8; 5]) -> Option<DateTime> {
        if *data == [0xFF; 5] {
            None
        } else {
            Some(DateTime::read(data))
        }
    }
}

impl fmt::Debug for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.date.fmt(f)?;
        f.write_char(' ')?;

        write_hundreds(f, self.hour)?;
        f.write_char(':')?;
        write_hundreds(f, self.minute)?;
        f.write_char(':')?;
        write_hundreds(f, self.second)
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp() {
        let ts = Timestamp::read_pcr(&[0xD2, 0x2D, 0x74, 0x82, 0x80, 0xF9]);
        assert_eq!(ts, Timestamp::new(7052388613, 249));
        assert_eq!(ts.base(), 7052388613);
        assert_eq!(ts.extension(), 249);
        assert_eq!(ts.full(), 7052388613 * 300 + 249);
        assert_eq!(
            ts.to_duration(),
            Duration::from_nanos((7052388613 * 300 + 249) * 1000 / 27),
        );

        assert_eq!(Timestamp::new(0, 0).to_duration(), Duration::ZERO);
        std::panic::catch_unwind(|| Timestamp::new(1 << 33, 0)).unwrap_err();
        std::panic::catch_unwind(|| Timestamp::new(0, 512)).unwrap_err();
    }

    #[test]
    fn test_date_time() {
        // MJD = 45218, HMS = 12:34:56
        let date = MjdDate::read(&[0xB0, 0xA2]);
        assert_eq!(date.year, 82);
        assert_eq!(date.month, 9);
        assert_eq!(date.day, 6);
        assert_eq!(date.day_of_week, 1);
        assert_eq!(date.to_string(), "1982-09-06");

        // MJD = 49273
        let date = MjdDate::read(&[0xC0, 0x79]);
        assert_eq!(date.to_string(), "1993-10-13");
        assert_eq!(date.day_of_week, 3);

        let dt = DateTime::read(&[0xB0, 0xA2, 0x12, 0x34, 0x56]);
        assert_eq!(dt.date.year, 82);
        assert_eq!(dt.hour, 12);
        assert_eq!(dt.minute, 34);
        assert_eq!(dt.second, 56);
        assert_eq!(dt.to_string(), "1982-09-06 12:34:56");

        assert_eq!(MjdDate::read_opt(&[0xFF, 0xFF]), None);
        assert_matches::assert_matches!(MjdDate::read_opt(&[0xB0, 0xA2]), Some(_));
        assert_eq!(DateTime::read_opt(&[0xFF; 5]), None);
    }
}
