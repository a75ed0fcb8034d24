//! SQL 힌트
//!
//! `/*!key1=value1;key2=value2;*/` 형태의 인라인 라우팅 힌트를 파싱합니다.

use std::collections::HashMap;

use crate::routing::{RouteError, RouteResult};

/// 힌트 주석 시작 토큰
const HINT_OPEN: &str = "/*!";
/// 힌트 주석 종료 토큰
const HINT_CLOSE: &str = "*/";
/// 세그먼트 구분자
const SEGMENT_DELIMITER: char = ';';
/// 키/값 구분자
const KEY_VALUE_DELIMITER: char = '=';

/// 대상 노드 이름 힌트 키
pub const NODE_NAME_KEY: &str = "nodeName";
/// 노드 타입 힌트 키 (deprecated)
pub const ROUTING_TYPE_KEY: &str = "routingType";

// ============================================================================
// SqlHint - 인라인 힌트
// ============================================================================

/// 파싱된 SQL 힌트
///
/// 힌트가 없는 SQL도 빈 맵을 가진 `SqlHint`로 표현됩니다.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlHint {
    /// 힌트 키/값
    hints: HashMap<String, String>,
    /// 힌트가 제거된 SQL
    native_sql: String,
}

impl SqlHint {
    /// 새 힌트 생성
    pub fn new(hints: HashMap<String, String>, native_sql: impl Into<String>) -> Self {
        Self {
            hints,
            native_sql: native_sql.into(),
        }
    }

    /// SQL에서 힌트 파싱
    ///
    /// 공백 SQL이면 `None`을 반환합니다. 문장 맨 앞의 힌트 주석만 해석하고 제거하며,
    /// 문장 중간(문자열 리터럴 포함)의 `/*!`는 SQL 본문으로 남습니다.
    pub fn parse(sql: &str) -> RouteResult<Option<Self>> {
        let trimmed = sql.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        let Some(after_open) = trimmed.strip_prefix(HINT_OPEN) else {
            return Ok(Some(Self::new(HashMap::new(), trimmed)));
        };
        let Some((body, rest)) = after_open.split_once(HINT_CLOSE) else {
            // 닫히지 않은 주석은 힌트가 아님
            return Ok(Some(Self::new(HashMap::new(), trimmed)));
        };

        let hints = split_hint(sql, body)?;
        Ok(Some(Self::new(hints, rest.trim())))
    }

    /// 힌트 값 조회
    pub fn get(&self, key: &str) -> Option<&str> {
        self.hints.get(key).map(String::as_str)
    }

    /// 대상 노드 이름
    pub fn node_name(&self) -> Option<&str> {
        self.get(NODE_NAME_KEY)
    }

    /// 라우팅 타입 (deprecated)
    pub fn routing_type(&self) -> Option<&str> {
        self.get(ROUTING_TYPE_KEY)
    }

    /// 힌트 맵
    pub fn hints(&self) -> &HashMap<String, String> {
        &self.hints
    }

    /// 힌트가 제거된 SQL
    pub fn native_sql(&self) -> &str {
        &self.native_sql
    }

    /// 힌트가 비어있는지 확인
    pub fn is_empty(&self) -> bool {
        self.hints.is_empty()
    }

    /// 힌트 개수
    pub fn len(&self) -> usize {
        self.hints.len()
    }
}

/// 힌트 본문을 키/값 맵으로 분리
fn split_hint(sql: &str, body: &str) -> RouteResult<HashMap<String, String>> {
    let mut hints = HashMap::new();

    for segment in body.split(SEGMENT_DELIMITER) {
        if segment.trim().is_empty() {
            continue;
        }

        let mut parts = segment.split(KEY_VALUE_DELIMITER);
        let (key, value) = match (parts.next(), parts.next(), parts.next()) {
            (Some(key), Some(value), None) => (key.trim(), value.trim()),
            _ => {
                return Err(RouteError::parse(
                    sql,
                    format!(
                        "hint key and value in SQL annotations must be separated by an equal sign (=), segment [{}]",
                        segment.trim()
                    ),
                ))
            }
        };

        if key.is_empty() || value.is_empty() {
            return Err(RouteError::parse(
                sql,
                format!("hint key and value must not be empty, segment [{}]", segment.trim()),
            ));
        }

        hints.insert(key.to_string(), value.to_string());
    }

    Ok(hints)
}
