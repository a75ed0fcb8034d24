//! SQL 속성
//!
//! 구문 분석 결과: 문장 종류, 읽기/쓰기 여부, 역할별 테이블 목록, 힌트

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use super::hint::SqlHint;

// ============================================================================
// SqlType - 문장 종류
// ============================================================================

/// SQL 문장 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SqlType {
    /// SELECT 쿼리
    Select,
    /// INSERT
    Insert,
    /// UPDATE
    Update,
    /// DELETE
    Delete,
    /// SHOW 계열 조회
    Show,
    /// EXPLAIN / DESCRIBE
    Explain,
    /// 그 외 (DDL, 트랜잭션 제어 등)
    Other,
}

impl SqlType {
    /// 문자열에서 파싱
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "SELECT" => Some(Self::Select),
            "INSERT" => Some(Self::Insert),
            "UPDATE" => Some(Self::Update),
            "DELETE" => Some(Self::Delete),
            "SHOW" => Some(Self::Show),
            "EXPLAIN" | "DESCRIBE" => Some(Self::Explain),
            "OTHER" => Some(Self::Other),
            _ => None,
        }
    }

    /// 문자열로 변환
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Select => "SELECT",
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Show => "SHOW",
            Self::Explain => "EXPLAIN",
            Self::Other => "OTHER",
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// TableRole - 테이블 역할
// ============================================================================

/// 문장 내 테이블이 등장한 절의 역할
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TableRole {
    /// FROM 절
    From,
    /// JOIN 절
    Join,
    /// 서브쿼리 (파생 테이블, 조건절, CTE 등)
    SubSelect,
    /// INSERT 대상
    Insert,
    /// UPDATE 대상
    Update,
    /// DELETE 대상
    Delete,
}

impl TableRole {
    /// 쓰기 대상 역할 여부
    pub fn is_write(&self) -> bool {
        matches!(self, Self::Insert | Self::Update | Self::Delete)
    }
}

// ============================================================================
// Table - 테이블 참조
// ============================================================================

/// 테이블 참조 (스키마 선택적)
///
/// 동등성은 전체 이름(`database.name`) 기준입니다.
#[derive(Debug, Clone, Eq)]
pub struct Table {
    /// 스키마/데이터베이스
    database: Option<String>,
    /// 테이블 이름
    name: String,
}

impl Table {
    /// 새 테이블 참조 생성
    pub fn new(database: Option<String>, name: impl Into<String>) -> Self {
        Self {
            database,
            name: name.into(),
        }
    }

    /// 스키마
    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    /// 테이블 이름
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 전체 이름
    pub fn full_name(&self) -> String {
        match &self.database {
            Some(db) => format!("{}.{}", db, self.name),
            None => self.name.clone(),
        }
    }
}

impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        self.full_name() == other.full_name()
    }
}

impl Hash for Table {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.full_name().hash(state);
    }
}

impl PartialOrd for Table {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Table {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.full_name().cmp(&other.full_name())
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}

// ============================================================================
// SqlAttribute - SQL 속성
// ============================================================================

/// 분류된 SQL 문장
///
/// 문장마다 한 번 생성되며 이후 변경되지 않습니다.
#[derive(Debug, Clone)]
pub struct SqlAttribute {
    pub(crate) sql: String,
    pub(crate) native_sql: String,
    pub(crate) sql_type: SqlType,
    pub(crate) write: bool,
    pub(crate) read: bool,
    pub(crate) tables: BTreeMap<TableRole, BTreeSet<Table>>,
    pub(crate) databases: BTreeSet<String>,
    pub(crate) hint: Option<SqlHint>,
    pub(crate) fallback: bool,
}

impl SqlAttribute {
    /// 분석 실패 시 사용하는 보수적 속성 (쓰기 노드로 라우팅)
    pub fn fallback(sql: impl Into<String>, native_sql: impl Into<String>, hint: Option<SqlHint>) -> Self {
        Self {
            sql: sql.into(),
            native_sql: native_sql.into(),
            sql_type: SqlType::Other,
            write: true,
            read: false,
            tables: BTreeMap::new(),
            databases: BTreeSet::new(),
            hint,
            fallback: true,
        }
    }

    /// 원본 SQL
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// 힌트가 제거된 SQL
    pub fn native_sql(&self) -> &str {
        &self.native_sql
    }

    /// 문장 종류
    pub fn sql_type(&self) -> SqlType {
        self.sql_type
    }

    /// 쓰기 문장 여부
    pub fn is_write(&self) -> bool {
        self.write
    }

    /// 읽기 문장 여부
    pub fn is_read(&self) -> bool {
        self.read
    }

    /// 분석 실패로 대체된 속성인지 여부
    pub fn is_fallback(&self) -> bool {
        self.fallback
    }

    /// 힌트
    pub fn hint(&self) -> Option<&SqlHint> {
        self.hint.as_ref()
    }

    /// 힌트 값 조회
    pub fn hint_value(&self, key: &str) -> Option<&str> {
        self.hint.as_ref().and_then(|h| h.get(key))
    }

    /// 비어있지 않은 힌트 보유 여부
    pub fn has_hint(&self) -> bool {
        self.hint.as_ref().map_or(false, |h| !h.is_empty())
    }

    /// 역할별 테이블
    pub fn tables_of(&self, role: TableRole) -> impl Iterator<Item = &Table> {
        self.tables.get(&role).into_iter().flatten()
    }

    /// 참조된 모든 테이블
    pub fn tables(&self) -> BTreeSet<&Table> {
        self.tables.values().flatten().collect()
    }

    /// 읽기 대상 테이블
    pub fn read_tables(&self) -> BTreeSet<&Table> {
        self.tables
            .iter()
            .filter(|(role, _)| !role.is_write())
            .flat_map(|(_, tables)| tables)
            .collect()
    }

    /// 쓰기 대상 테이블
    pub fn write_tables(&self) -> BTreeSet<&Table> {
        self.tables
            .iter()
            .filter(|(role, _)| role.is_write())
            .flat_map(|(_, tables)| tables)
            .collect()
    }

    /// 참조된 스키마 목록
    pub fn databases(&self) -> &BTreeSet<String> {
        &self.databases
    }
}

impl fmt::Display for SqlAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.sql_type, self.native_sql)
    }
}
