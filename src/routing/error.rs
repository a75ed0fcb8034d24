//! Routing Error Types
//!
//! 라우팅 에러 정의

use std::io;
use thiserror::Error;

// ============================================================================
// RouteError - 라우팅 에러
// ============================================================================

/// 라우팅 에러
#[derive(Error, Debug)]
pub enum RouteError {
    /// SQL 또는 힌트 파싱 에러
    #[error("Parse error: {message}, SQL [{sql}]")]
    Parse {
        /// 원본 SQL
        sql: String,
        /// 에러 메시지
        message: String,
    },

    /// 설정 에러 (존재하지 않는 노드/클러스터 등)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// 라우팅 불가 에러
    #[error("Route error: {0}")]
    Route(String),

    /// 헬스 체크 프로브 에러
    #[error("Probe error on node {node}: {message}")]
    Probe {
        /// 노드 이름
        node: String,
        /// 에러 메시지
        message: String,
    },

    /// 설정 파일 파싱 에러
    #[error("Config file error in {source_name}: {message}")]
    ConfigFile {
        /// 설정 소스 이름 (파일 경로 등)
        source_name: String,
        /// 에러 메시지
        message: String,
    },

    /// I/O 에러
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// 내부 에러
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RouteError {
    /// 파싱 에러 생성
    pub fn parse(sql: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            sql: sql.into(),
            message: message.into(),
        }
    }

    /// 설정 에러 생성
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// 라우팅 에러 생성
    pub fn route(msg: impl Into<String>) -> Self {
        Self::Route(msg.into())
    }

    /// 프로브 에러 생성
    pub fn probe(node: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Probe {
            node: node.into(),
            message: message.into(),
        }
    }

    /// 설정 파일 에러 생성
    pub fn config_file(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigFile {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// 내부 에러 생성
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// 파싱 에러 여부
    pub fn is_parse(&self) -> bool {
        matches!(self, Self::Parse { .. })
    }

    /// 설정 에러 여부
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::ConfigFile { .. })
    }

    /// 라우팅 에러 여부
    pub fn is_route(&self) -> bool {
        matches!(self, Self::Route(_))
    }
}

/// 라우팅 결과 타입
pub type RouteResult<T> = Result<T, RouteError>;
