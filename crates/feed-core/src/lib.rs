//! # Feed Core
//!
//! 실시간 시장 데이터 배포 계층의 핵심 타입을 제공합니다.
//!
//! 이 크레이트는 스트림 크레이트와 CLI가 공유하는 기본 요소를 제공합니다:
//! - 채널 이름 및 구독 payload 정규화
//! - 호가창, 체결, 사용자 주문, 심볼 컨텍스트, 계좌 마진 레코드
//! - 서버 payload를 정규화된 레코드로 바꾸는 디코더
//! - 설정 관리
//! - 로깅 인프라

pub mod channel;
pub mod config;
pub mod decode;
pub mod domain;
pub mod error;
pub mod logging;

pub use channel::*;
pub use self::config::*;
pub use domain::*;
pub use error::*;
pub use logging::*;
