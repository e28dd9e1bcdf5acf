//! FFI bindings for FAST Screen
//!
//! This module provides C-compatible functions for calling the screening core from
//! the host app. All functions use C strings (null-terminated) and return allocated
//! memory that must be freed by the caller using `fast_free_string`.
//!
//! Configuration arguments are optional: pass NULL to use the defaults.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::config::ScreeningConfig;
use crate::error::ScreeningError;
use crate::pipeline::{
    assess_json, score_face_frames_json, score_pose_frames_json, score_speech, score_speech_json,
    ScreeningProcessor, SpeechInput, TestResult,
};
use crate::session::{InMemorySessionRepository, JsonFileSessionRepository, SessionRepository};
use crate::types::{FaceFrame, PoseFrame, TestKind};

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Set the last error message
fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Clear the last error message
fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Required string argument; records the error when missing
unsafe fn required_arg(ptr: *const c_char, name: &str) -> Option<String> {
    let value = cstr_to_string(ptr);
    if value.is_none() {
        set_last_error(&format!("Invalid {name} string pointer"));
    }
    value
}

/// Configuration from an optional JSON argument (NULL = defaults)
unsafe fn config_arg(ptr: *const c_char) -> Result<ScreeningConfig, ScreeningError> {
    if ptr.is_null() {
        return Ok(ScreeningConfig::default());
    }
    let json = cstr_to_string(ptr)
        .ok_or_else(|| ScreeningError::ParseError("config is not valid UTF-8".to_string()))?;
    ScreeningConfig::from_json(&json)
}

/// Return a JSON result as a C string, or NULL with the error recorded
fn json_result(result: Result<String, ScreeningError>) -> *mut c_char {
    match result {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

fn status_result(result: Result<(), ScreeningError>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

// ============================================================================
// Stateless API
// ============================================================================

/// Score a face window given as a JSON array of face frames.
///
/// # Safety
/// - `frames_json` must be a valid null-terminated C string.
/// - `config_json` must be a valid null-terminated C string or NULL.
/// - Returns a newly allocated string that must be freed with `fast_free_string`.
/// - Returns NULL on error; call `fast_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn fast_score_face_frames(
    frames_json: *const c_char,
    config_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let Some(frames) = required_arg(frames_json, "frames JSON") else {
        return ptr::null_mut();
    };

    json_result(config_arg(config_json).and_then(|config| score_face_frames_json(&frames, &config)))
}

/// Score an arm window given as a JSON array of pose frames.
///
/// # Safety
/// - `frames_json` must be a valid null-terminated C string.
/// - `config_json` must be a valid null-terminated C string or NULL.
/// - Returns a newly allocated string that must be freed with `fast_free_string`.
/// - Returns NULL on error; call `fast_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn fast_score_pose_frames(
    frames_json: *const c_char,
    config_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let Some(frames) = required_arg(frames_json, "frames JSON") else {
        return ptr::null_mut();
    };

    json_result(config_arg(config_json).and_then(|config| score_pose_frames_json(&frames, &config)))
}

/// Score a finished recording (`{"segments": [...], "transcript": "...", "expected": "..."}`).
///
/// # Safety
/// - `input_json` must be a valid null-terminated C string.
/// - `config_json` must be a valid null-terminated C string or NULL.
/// - Returns a newly allocated string that must be freed with `fast_free_string`.
/// - Returns NULL on error; call `fast_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn fast_score_speech(
    input_json: *const c_char,
    config_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let Some(input) = required_arg(input_json, "speech JSON") else {
        return ptr::null_mut();
    };

    json_result(config_arg(config_json).and_then(|config| score_speech_json(&input, &config)))
}

/// Combine verdicts (`{"face": "normal", "arm": "abnormal", "speech": null}`) into a risk tier.
///
/// # Safety
/// - `verdicts_json` must be a valid null-terminated C string.
/// - `config_json` must be a valid null-terminated C string or NULL.
/// - Returns a newly allocated string that must be freed with `fast_free_string`.
/// - Returns NULL on error; call `fast_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn fast_assess(
    verdicts_json: *const c_char,
    config_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let Some(verdicts) = required_arg(verdicts_json, "verdicts JSON") else {
        return ptr::null_mut();
    };

    json_result(config_arg(config_json).and_then(|config| assess_json(&verdicts, &config)))
}

// ============================================================================
// Stateful Processor API
// ============================================================================

fn record_face(processor: &mut ScreeningProcessor, json: &str) -> Result<String, ScreeningError> {
    let frames: Vec<FaceFrame> = serde_json::from_str(json)?;
    Ok(serde_json::to_string(&processor.score_face_frames(&frames))?)
}

fn record_arm(processor: &mut ScreeningProcessor, json: &str) -> Result<String, ScreeningError> {
    let frames: Vec<PoseFrame> = serde_json::from_str(json)?;
    Ok(serde_json::to_string(&processor.score_pose_frames(&frames))?)
}

fn record_speech(processor: &mut ScreeningProcessor, json: &str) -> Result<String, ScreeningError> {
    let input: SpeechInput = serde_json::from_str(json)?;
    let analysis = score_speech(&input);
    let verdict = processor.record_speech(&analysis);
    Ok(serde_json::to_string(&TestResult {
        test: TestKind::Speech,
        verdict,
        analysis,
    })?)
}

/// Opaque handle to a ScreeningProcessor
pub struct ScreeningProcessorHandle {
    processor: ScreeningProcessor,
}

/// Create a new ScreeningProcessor.
///
/// # Safety
/// - `config_json` must be a valid null-terminated C string or NULL for defaults.
/// - `store_path` must be a valid null-terminated C string or NULL to keep history in memory.
/// - Returns a pointer to a newly allocated processor; free it with `fast_processor_free`.
/// - Returns NULL on error.
#[no_mangle]
pub unsafe extern "C" fn fast_processor_new(
    config_json: *const c_char,
    store_path: *const c_char,
) -> *mut ScreeningProcessorHandle {
    clear_last_error();

    let config = match config_arg(config_json) {
        Ok(config) => config,
        Err(e) => {
            set_last_error(&e.to_string());
            return ptr::null_mut();
        }
    };

    let repository: Box<dyn SessionRepository> = match cstr_to_string(store_path) {
        Some(path) => Box::new(JsonFileSessionRepository::new(path, config.history_limit)),
        None => Box::new(InMemorySessionRepository::new(config.history_limit)),
    };

    match ScreeningProcessor::new(config, repository) {
        Ok(processor) => Box::into_raw(Box::new(ScreeningProcessorHandle { processor })),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free a ScreeningProcessor.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `fast_processor_new`.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn fast_processor_free(processor: *mut ScreeningProcessorHandle) {
    if !processor.is_null() {
        drop(Box::from_raw(processor));
    }
}

/// Start a new session; returns its id.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `fast_processor_new`.
/// - Returns a newly allocated string that must be freed with `fast_free_string`.
#[no_mangle]
pub unsafe extern "C" fn fast_processor_begin_session(
    processor: *mut ScreeningProcessorHandle,
) -> *mut c_char {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return ptr::null_mut();
    }

    let handle = &mut *processor;
    string_to_cstr(&handle.processor.begin_session().to_string())
}

/// Score face frames and record the result in the open session.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `fast_processor_new`.
/// - `frames_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `fast_free_string`.
/// - Returns NULL on error; call `fast_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn fast_processor_record_face(
    processor: *mut ScreeningProcessorHandle,
    frames_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return ptr::null_mut();
    }

    let handle = &mut *processor;

    let Some(json) = required_arg(frames_json, "frames JSON") else {
        return ptr::null_mut();
    };

    json_result(record_face(&mut handle.processor, &json))
}

/// Score pose frames and record the result in the open session.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `fast_processor_new`.
/// - `frames_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `fast_free_string`.
/// - Returns NULL on error; call `fast_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn fast_processor_record_arm(
    processor: *mut ScreeningProcessorHandle,
    frames_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return ptr::null_mut();
    }

    let handle = &mut *processor;

    let Some(json) = required_arg(frames_json, "frames JSON") else {
        return ptr::null_mut();
    };

    json_result(record_arm(&mut handle.processor, &json))
}

/// Score a finished recording and record the result in the open session.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `fast_processor_new`.
/// - `input_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `fast_free_string`.
/// - Returns NULL on error; call `fast_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn fast_processor_record_speech(
    processor: *mut ScreeningProcessorHandle,
    input_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return ptr::null_mut();
    }

    let handle = &mut *processor;

    let Some(json) = required_arg(input_json, "speech JSON") else {
        return ptr::null_mut();
    };

    json_result(record_speech(&mut handle.processor, &json))
}

/// Forget one test (`"face"`, `"arm"` or `"speech"`) of the open session.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `fast_processor_new`.
/// - `test` must be a valid null-terminated C string.
/// - Returns 0 on success, non-zero on error.
#[no_mangle]
pub unsafe extern "C" fn fast_processor_clear_test(
    processor: *mut ScreeningProcessorHandle,
    test: *const c_char,
) -> i32 {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return -1;
    }

    let handle = &mut *processor;

    let Some(test) = required_arg(test, "test name") else {
        return -1;
    };

    status_result(test.parse::<TestKind>().map(|kind| handle.processor.clear_test(kind)))
}

/// Save the open session; returns the saved session with its risk tier.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `fast_processor_new`.
/// - Returns a newly allocated string that must be freed with `fast_free_string`.
/// - Returns NULL on error; call `fast_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn fast_processor_save_session(
    processor: *mut ScreeningProcessorHandle,
) -> *mut c_char {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return ptr::null_mut();
    }

    let handle = &mut *processor;

    json_result(
        handle
            .processor
            .save_current()
            .and_then(|session| Ok(serde_json::to_string(&session)?)),
    )
}

/// Saved sessions as a JSON array, newest first.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `fast_processor_new`.
/// - Returns a newly allocated string that must be freed with `fast_free_string`.
/// - Returns NULL on error; call `fast_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn fast_processor_history(
    processor: *mut ScreeningProcessorHandle,
) -> *mut c_char {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return ptr::null_mut();
    }

    let handle = &*processor;

    json_result(
        handle
            .processor
            .history()
            .and_then(|sessions| Ok(serde_json::to_string(&sessions)?)),
    )
}

/// Delete all saved sessions.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `fast_processor_new`.
/// - Returns 0 on success, non-zero on error.
#[no_mangle]
pub unsafe extern "C" fn fast_processor_clear_history(
    processor: *mut ScreeningProcessorHandle,
) -> i32 {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return -1;
    }

    let handle = &mut *processor;
    status_result(handle.processor.clear_history())
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by FAST Screen functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a FAST Screen function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn fast_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next FAST Screen call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn fast_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn fast_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    fn take_string(ptr: *mut c_char) -> String {
        assert!(!ptr.is_null());
        unsafe {
            let s = CStr::from_ptr(ptr).to_str().unwrap().to_string();
            fast_free_string(ptr);
            s
        }
    }

    fn pose_frames_json() -> CString {
        let frame = r#"{"timestamp": 0.0, "joints": {
            "left_shoulder": {"x": 0.4, "y": 0.5, "confidence": 0.9},
            "right_shoulder": {"x": 0.6, "y": 0.5, "confidence": 0.9},
            "left_elbow": {"x": 0.25, "y": 0.5, "confidence": 0.9},
            "right_elbow": {"x": 0.75, "y": 0.5, "confidence": 0.9},
            "left_wrist": {"x": 0.1, "y": 0.5, "confidence": 0.9},
            "right_wrist": {"x": 0.9, "y": 0.5, "confidence": 0.9}
        }}"#;
        CString::new(format!("[{}]", vec![frame; 10].join(","))).unwrap()
    }

    #[test]
    fn test_ffi_score_pose_frames() {
        let frames = pose_frames_json();
        unsafe {
            let result = take_string(fast_score_pose_frames(frames.as_ptr(), ptr::null()));
            let value: serde_json::Value = serde_json::from_str(&result).unwrap();
            assert_eq!(value["verdict"], "normal");
            assert_eq!(value["analysis"]["valid_frames"], 10);
        }
    }

    #[test]
    fn test_ffi_assess_with_config() {
        let verdicts = CString::new(r#"{"face": "inconclusive"}"#).unwrap();
        let config = CString::new(r#"{"verdict": {"aggregation": "abnormal_only"}}"#).unwrap();
        unsafe {
            let broad = take_string(fast_assess(verdicts.as_ptr(), ptr::null()));
            assert!(broad.contains("possible_stroke"));

            let strict = take_string(fast_assess(verdicts.as_ptr(), config.as_ptr()));
            assert!(strict.contains("no_stroke"));
        }
    }

    #[test]
    fn test_ffi_processor_lifecycle() {
        unsafe {
            let processor = fast_processor_new(ptr::null(), ptr::null());
            assert!(!processor.is_null());

            let id = take_string(fast_processor_begin_session(processor));
            assert!(!id.is_empty());

            let frames = pose_frames_json();
            let arm = take_string(fast_processor_record_arm(processor, frames.as_ptr()));
            assert!(arm.contains("\"test\":\"arm\""));

            let speech = CString::new(
                r#"{"segments": [{"text": "hello", "confidence": 0.2, "timestamp": 0.0, "duration": 0.5}],
                    "expected": "hello"}"#,
            )
            .unwrap();
            let speech = take_string(fast_processor_record_speech(processor, speech.as_ptr()));
            assert!(speech.contains("inconclusive"));

            let test = CString::new("speech").unwrap();
            assert_eq!(fast_processor_clear_test(processor, test.as_ptr()), 0);

            let saved = take_string(fast_processor_save_session(processor));
            let session: serde_json::Value = serde_json::from_str(&saved).unwrap();
            assert_eq!(session["id"], id.as_str());
            assert_eq!(session["risk_tier"], "no_stroke");
            assert_eq!(session["speech_verdict"], serde_json::Value::Null);

            let history = take_string(fast_processor_history(processor));
            let history: serde_json::Value = serde_json::from_str(&history).unwrap();
            assert_eq!(history.as_array().unwrap().len(), 1);

            assert_eq!(fast_processor_clear_history(processor), 0);
            fast_processor_free(processor);
        }
    }

    #[test]
    fn test_ffi_error_handling() {
        unsafe {
            let invalid_json = CString::new("not json").unwrap();
            let result = fast_score_face_frames(invalid_json.as_ptr(), ptr::null());
            assert!(result.is_null());

            let error = fast_last_error();
            assert!(!error.is_null());
            let error_str = CStr::from_ptr(error).to_str().unwrap();
            assert!(!error_str.is_empty());

            let bad_config = CString::new(r#"{"history_limit": 0}"#).unwrap();
            assert!(fast_processor_new(bad_config.as_ptr(), ptr::null()).is_null());

            let processor = fast_processor_new(ptr::null(), ptr::null());
            assert!(fast_processor_save_session(processor).is_null());
            let unknown = CString::new("legs").unwrap();
            assert_eq!(fast_processor_clear_test(processor, unknown.as_ptr()), -1);
            fast_processor_free(processor);
        }
    }

    #[test]
    fn test_ffi_version() {
        unsafe {
            let version = fast_version();
            assert!(!version.is_null());

            let version_str = CStr::from_ptr(version).to_str().unwrap();
            assert!(!version_str.is_empty());
        }
    }
}
