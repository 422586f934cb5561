//! PID関連。

use std::fmt;

use crate::utils::BytesExt;

/// MPEG2-TSのPID（13ビット）。
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pid(u16);

// 定数のほとんどはARIB STD-B10による。
impl Pid {
    /// PIDの最大値。
    pub const MAX: u16 = 0x1FFF;

    /// プログラムアソシエーションテーブル（Program Association Table）。
    pub const PAT: Pid = Pid::new(0x0000);
    /// 限定受信テーブル（Conditional Access Table）。
    pub const CAT: Pid = Pid::new(0x0001);
    /// ネットワーク情報テーブル（Network Information Table）。
    pub const NIT: Pid = Pid::new(0x0010);
    /// サービス記述テーブル（Service Description Table）。
    pub const SDT: Pid = Pid::new(0x0011);
    /// ブーケアソシエーションテーブル（Bouquet Association Table）。
    pub const BAT: Pid = Pid::new(0x0011);
    /// イベント情報テーブル（Event Information Table）。
    pub const EIT: Pid = Pid::new(0x0012);
    /// 時刻日付テーブル（Time and Date Table）。
    pub const TDT: Pid = Pid::new(0x0014);
    /// 時刻日付オフセットテーブル（Time Offset Table）。
    pub const TOT: Pid = Pid::new(0x0014);
    /// 共通データテーブル（Common Data Table）。
    pub const CDT: Pid = Pid::new(0x0029);
    /// ヌルパケット（Null packet）。
    pub const NULL: Pid = Pid::new(0x1FFF);

    /// `Pid`を生成する。
    ///
    /// # パニック
    ///
    /// `pid`の値が範囲外の際はパニックする。
    #[inline]
    pub const fn new(pid: u16) -> Pid {
        assert!(pid <= Pid::MAX);
        Pid(pid)
    }

    /// `pid`がPIDとして範囲内であれば`Pid`を生成する。
    #[inline]
    pub const fn try_new(pid: u16) -> Option<Pid> {
        if pid > Pid::MAX {
            None
        } else {
            Some(Pid(pid))
        }
    }

    /// `data`からPIDを読み出す。
    ///
    /// # パニック
    ///
    /// `data`の長さが2未満の場合、このメソッドはパニックする。
    #[inline]
    pub fn read(data: &[u8]) -> Pid {
        Pid(data[0..=1].read_be_16() & 0x1FFF)
    }

    /// PIDを`u16`で返す。
    #[inline]
    pub const fn get(&self) -> u16 {
        // Safety: `Pid`を生成できている時点で値は範囲内
        unsafe { crate::utils::assume!(self.0 <= Pid::MAX) }
        self.0
    }
}

impl Default for Pid {
    fn default() -> Self {
        Pid::NULL
    }
}

impl From<Pid> for u16 {
    fn from(value: Pid) -> Self {
        value.get()
    }
}

impl fmt::Debug for Pid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Pid(0x{:04X})", self.0)
    }
}

crate::utils::delegate_fmt!(Pid);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pid() {
        assert_eq!(Pid::new(0x1FFF), Pid::NULL);
        std::panic::catch_unwind(|| Pid::new(0x2000)).unwrap_err();
        assert_eq!(Pid::try_new(0x1FFF), Some(Pid::NULL));
        assert_eq!(Pid::try_new(0x2000), None);

        std::panic::catch_unwind(|| Pid::read(&[])).unwrap_err();
        std::panic::catch_unwind(|| Pid::read(&[0x00])).unwrap_err();
        assert_eq!(Pid::read(&u16::to_be_bytes(0x0000)), Pid::new(0x0000));
        assert_eq!(Pid::read(&u16::to_be_bytes(0x2000)), Pid::new(0x0000));
        assert_eq!(Pid::read(&[0x61, 0x01]), Pid::new(0x0101));

        assert_eq!(Pid::default(), Pid::NULL);

        assert_eq!(Pid::PAT.get(), 0x0000);
        assert_eq!(u16::from(Pid::NULL), 0x1FFF);

        assert_eq!(format!("{}", Pid::NULL), "8191");
        assert_eq!(format!("{:04X}", Pid::NULL), "1FFF");
        assert_eq!(format!("{:?}", Pid::PAT), "Pid(0x0000)");
    }
}
