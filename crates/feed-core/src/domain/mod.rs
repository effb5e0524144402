//! 시장 데이터 배포를 위한 도메인 레코드.
//!
//! 모든 레코드는 디코더가 생성하며 핸들러와 상태 컨테이너로 전달됩니다.

mod account;
mod market;
mod order;
mod symbol;

pub use account::*;
pub use market::*;
pub use order::*;
pub use symbol::*;

/// 금융 정밀도를 위한 가격 타입.
pub type Price = rust_decimal::Decimal;

/// 수량 타입.
pub type Quantity = rust_decimal::Decimal;
