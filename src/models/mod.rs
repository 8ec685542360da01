pub mod stock;
pub mod news;
pub mod currency;
pub mod response;

pub use stock::*;
pub use news::*;
pub use currency::*;
pub use response::*;

/// 规范化记录的可用性判定
///
/// 适配器解析出的记录只有通过该检查才算"有数据"，否则回退链继续尝试下一个数据源
pub trait Usable {
    fn is_usable(&self) -> bool;
}

impl<T: Usable> Usable for Vec<T> {
    fn is_usable(&self) -> bool {
        !self.is_empty() && self.iter().all(Usable::is_usable)
    }
}
