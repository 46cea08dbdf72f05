//! 수집기 ↔ 감시 프로세스 간 종료 코드 규약.
//!
//! 감시 프로세스는 종료 코드로 재시작 여부를 판단합니다.

/// 모든 심볼 처리 완료 (일부 `failed` 포함). 감시 종료.
pub const SUCCESS: i32 = 0;

/// 일반 실패 (출력 기록 실패 등). 즉시 재시작.
pub const FAILURE: i32 = 1;

/// 세션/인증 상실. 새 세션으로 즉시 재시작.
pub const SESSION_LOST: i32 = 2;

/// 설정 오류 또는 체크포인트 손상. 재시작해도 복구되지 않으므로 감시 중단.
///
/// sysexits.h의 `EX_CONFIG`와 같은 값입니다.
pub const FATAL_CONFIG: i32 = 78;

/// 재시작으로 복구 불가능한 종료 코드인지 확인합니다.
pub fn is_unrecoverable(code: i32) -> bool {
    code == FATAL_CONFIG
}
