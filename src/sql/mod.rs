//! SQL 분류 모듈
//!
//! SQL 텍스트를 구조화된 속성(문장 종류, 읽기/쓰기 여부, 테이블, 인라인 힌트)으로
//! 변환합니다.
//!
//! # 예시
//!
//! ```rust
//! use sqlroute::sql::{SqlClassifier, SqlType};
//!
//! let classifier = SqlClassifier::default();
//! let attr = classifier
//!     .classify("/*!nodeName=write_0;*/ select * from t")
//!     .unwrap()
//!     .unwrap();
//!
//! assert_eq!(attr.sql_type(), SqlType::Select);
//! assert_eq!(attr.native_sql(), "select * from t");
//! assert_eq!(attr.hint().unwrap().node_name(), Some("write_0"));
//! ```

mod attribute;
mod hint;
mod parser;

pub use attribute::{SqlAttribute, SqlType, Table, TableRole};
pub use hint::{SqlHint, NODE_NAME_KEY, ROUTING_TYPE_KEY};
pub use parser::SqlClassifier;
