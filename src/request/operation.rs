//! Typed operations and their translation into wire requests.
//!
//! Every `(resource, operation)` pair the API supports is a variant of
//! [`Operation`]. Parsing validates an item's parameters once; rendering a
//! variant into a [`RequestSpec`] is an exhaustive match, so a new variant
//! cannot be added without also giving it an endpoint.

use super::params::ParamMap;
use super::{Method, RequestSpec};
use crate::{Error, Result};
use serde::Serialize;
use std::fmt;

pub const DEFAULT_IMAGE_MODEL: &str = "kling-v1";
pub const DEFAULT_VIDEO_MODEL: &str = "kling-v1";
pub const DEFAULT_TRY_ON_MODEL: &str = "kolors-virtual-try-on-v1";
pub const DEFAULT_ASPECT_RATIO: &str = "16:9";

const VIDEO_MODES: &[&str] = &["std", "pro"];
const VIDEO_DURATIONS: &[&str] = &["5", "10"];
const IMAGE_REFERENCES: &[&str] = &["subject", "face"];
const VOICE_LANGUAGES: &[&str] = &["zh", "en"];
const AUDIO_TYPES: &[&str] = &["file", "url"];

/// Top-level API capability an item targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Image,
    Video,
    TryOn,
    Account,
}

impl Resource {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "image" => Some(Resource::Image),
            "video" => Some(Resource::Video),
            "tryOn" => Some(Resource::TryOn),
            "account" => Some(Resource::Account),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Image => "image",
            Resource::Video => "video",
            Resource::TryOn => "tryOn",
            Resource::Account => "account",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of video task, as used in the get/list paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoType {
    Text2Video,
    Image2Video,
    LipSync,
    VideoExtend,
    Effects,
}

impl VideoType {
    const NAMES: &'static [&'static str] =
        &["text2video", "image2video", "lipSync", "videoExtend", "effects"];

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "text2video" => Some(VideoType::Text2Video),
            "image2video" => Some(VideoType::Image2Video),
            "lipSync" => Some(VideoType::LipSync),
            "videoExtend" => Some(VideoType::VideoExtend),
            "effects" => Some(VideoType::Effects),
            _ => None,
        }
    }

    pub fn path_segment(&self) -> &'static str {
        match self {
            VideoType::Text2Video => "text2video",
            VideoType::Image2Video => "image2video",
            VideoType::LipSync => "lip-sync",
            VideoType::VideoExtend => "video-extend",
            VideoType::Effects => "effects",
        }
    }

    fn from_params(params: &ParamMap<'_>) -> Result<Self> {
        let raw = params.choice("videoType", Self::NAMES, "text2video")?;
        Self::parse(&raw).ok_or_else(|| Error::invalid("videoType", raw))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageCreate {
    pub model_name: String,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    pub n: u32,
    pub aspect_ratio: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_fidelity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Text2Video {
    pub model_name: String,
    pub prompt: String,
    pub mode: String,
    pub duration: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cfg_scale: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_task_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Image2Video {
    pub model_name: String,
    pub mode: String,
    pub image: String,
    pub duration: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_tail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cfg_scale: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_task_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LipSyncMode {
    #[serde(rename = "text2video")]
    Text,
    #[serde(rename = "audio2video")]
    Audio,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LipSyncInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    pub mode: LipSyncMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_speed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LipSync {
    pub input: LipSyncInput,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TryOnCreate {
    pub model_name: String,
    pub human_image: String,
    pub cloth_image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
}

/// Lookup of a single task by its identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskLookup {
    pub task_id: String,
}

/// Lookup of a video task; `task_id` is whichever identifier won.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoLookup {
    pub video_type: VideoType,
    pub task_id: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Page {
    pub page_num: Option<u32>,
    pub page_size: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoList {
    pub video_type: VideoType,
    pub page: Page,
}

/// Account cost query; times are Unix milliseconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CostQuery {
    pub start_time: i64,
    pub end_time: i64,
    pub resource_pack_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImageOperation {
    Create(ImageCreate),
    Get(TaskLookup),
    List(Page),
}

#[derive(Debug, Clone, PartialEq)]
pub enum VideoOperation {
    Text2Video(Text2Video),
    Image2Video(Image2Video),
    LipSync(LipSync),
    Get(VideoLookup),
    List(VideoList),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TryOnOperation {
    Create(TryOnCreate),
    Get(TaskLookup),
    List(Page),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AccountOperation {
    GetResourcePackages(CostQuery),
}

/// A fully validated operation, ready to be rendered into a request.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Image(ImageOperation),
    Video(VideoOperation),
    TryOn(TryOnOperation),
    Account(AccountOperation),
}

pub type Parser = fn(&ParamMap<'_>) -> Result<Operation>;

/// Every supported `(resource, operation)` pair and the parser for it.
pub const OPERATIONS: &[(Resource, &str, Parser)] = &[
    (Resource::Image, "create", parse_image_create),
    (Resource::Image, "get", parse_image_get),
    (Resource::Image, "list", parse_image_list),
    (Resource::Video, "text2video", parse_text2video),
    (Resource::Video, "image2video", parse_image2video),
    (Resource::Video, "lipSync", parse_lip_sync),
    (Resource::Video, "get", parse_video_get),
    (Resource::Video, "list", parse_video_list),
    (Resource::TryOn, "create", parse_try_on_create),
    (Resource::TryOn, "get", parse_try_on_get),
    (Resource::TryOn, "list", parse_try_on_list),
    (Resource::Account, "getResourcePackages", parse_cost_query),
];

impl Operation {
    /// Validate `params` for the named resource and operation.
    pub fn parse(resource: &str, operation: &str, params: &ParamMap<'_>) -> Result<Self> {
        let unsupported = || Error::UnsupportedOperation {
            resource: resource.to_string(),
            operation: operation.to_string(),
        };

        let resource = Resource::parse(resource).ok_or_else(unsupported)?;
        let (_, _, parser) = OPERATIONS
            .iter()
            .find(|(r, op, _)| *r == resource && *op == operation)
            .ok_or_else(unsupported)?;

        parser(params)
    }

    /// Render the wire request for this operation.
    pub fn to_request(&self) -> Result<RequestSpec> {
        let spec = match self {
            Operation::Image(op) => match op {
                ImageOperation::Create(body) => {
                    RequestSpec::post("/v1/images/generations", serde_json::to_value(body)?)
                }
                ImageOperation::Get(lookup) => RequestSpec::get(format!(
                    "/v1/images/generations/{}",
                    urlencoding::encode(&lookup.task_id)
                )),
                ImageOperation::List(page) => {
                    RequestSpec::get("/v1/images/generations").with_query(page.query())
                }
            },
            Operation::Video(op) => match op {
                VideoOperation::Text2Video(body) => {
                    RequestSpec::post("/v1/videos/text2video", serde_json::to_value(body)?)
                }
                VideoOperation::Image2Video(body) => {
                    RequestSpec::post("/v1/videos/image2video", serde_json::to_value(body)?)
                }
                VideoOperation::LipSync(body) => {
                    RequestSpec::post("/v1/videos/lip-sync", serde_json::to_value(body)?)
                }
                VideoOperation::Get(lookup) => RequestSpec::get(format!(
                    "/v1/videos/{}/{}",
                    lookup.video_type.path_segment(),
                    urlencoding::encode(&lookup.task_id)
                )),
                VideoOperation::List(list) => {
                    RequestSpec::get(format!("/v1/videos/{}", list.video_type.path_segment()))
                        .with_query(list.page.query())
                }
            },
            Operation::TryOn(op) => match op {
                TryOnOperation::Create(body) => RequestSpec::post(
                    "/v1/images/kolors-virtual-try-on",
                    serde_json::to_value(body)?,
                ),
                TryOnOperation::Get(lookup) => RequestSpec::get(format!(
                    "/v1/images/kolors-virtual-try-on/{}",
                    urlencoding::encode(&lookup.task_id)
                )),
                TryOnOperation::List(page) => {
                    RequestSpec::get("/v1/images/kolors-virtual-try-on").with_query(page.query())
                }
            },
            Operation::Account(AccountOperation::GetResourcePackages(query)) => {
                RequestSpec::get("/account/costs").with_query(query.query())
            }
        };

        debug_assert!(spec.method == Method::Post || spec.body.is_none());
        Ok(spec)
    }
}

impl Page {
    fn from_params(params: &ParamMap<'_>) -> Result<Self> {
        Ok(Self {
            page_num: params
                .integer("pageNum", 1..=i64::from(u32::MAX))?
                .map(|n| n as u32),
            page_size: params.integer("pageSize", 1..=500)?.map(|n| n as u32),
        })
    }

    fn query(&self) -> Vec<(String, String)> {
        let mut query = Vec::new();
        if let Some(num) = self.page_num {
            query.push(("pageNum".to_string(), num.to_string()));
        }
        if let Some(size) = self.page_size {
            query.push(("pageSize".to_string(), size.to_string()));
        }
        query
    }
}

impl CostQuery {
    fn query(&self) -> Vec<(String, String)> {
        let mut query = vec![
            ("start_time".to_string(), self.start_time.to_string()),
            ("end_time".to_string(), self.end_time.to_string()),
        ];
        if let Some(name) = &self.resource_pack_name {
            query.push(("resource_pack_name".to_string(), name.clone()));
        }
        query
    }
}

/// Task identifiers fill exactly one path segment; `.` and `..` would be
/// collapsed by URL normalisation and are refused.
fn checked_task_id(name: &str, id: String) -> Result<String> {
    if id == "." || id == ".." {
        return Err(Error::invalid(name, format!("'{}' is not a task identifier", id)));
    }
    Ok(id)
}

fn parse_image_create(params: &ParamMap<'_>) -> Result<Operation> {
    let image_reference = match params.string("imageReference")? {
        Some(_) => Some(params.choice("imageReference", IMAGE_REFERENCES, "subject")?),
        None => None,
    };

    Ok(Operation::Image(ImageOperation::Create(ImageCreate {
        model_name: params.string_or("model", DEFAULT_IMAGE_MODEL)?,
        prompt: params.required_string("prompt")?,
        negative_prompt: params.string("negativePrompt")?,
        n: params.integer("n", 1..=9)?.unwrap_or(1) as u32,
        aspect_ratio: params.string_or("aspectRatio", DEFAULT_ASPECT_RATIO)?,
        image: params.string("image")?,
        image_reference,
        image_fidelity: params.number("imageFidelity", 0.0..=1.0)?,
        callback_url: params.string("callbackUrl")?,
    })))
}

fn parse_image_get(params: &ParamMap<'_>) -> Result<Operation> {
    Ok(Operation::Image(ImageOperation::Get(TaskLookup {
        task_id: checked_task_id("taskId", params.required_string("taskId")?)?,
    })))
}

fn parse_image_list(params: &ParamMap<'_>) -> Result<Operation> {
    Ok(Operation::Image(ImageOperation::List(Page::from_params(
        params,
    )?)))
}

fn parse_text2video(params: &ParamMap<'_>) -> Result<Operation> {
    Ok(Operation::Video(VideoOperation::Text2Video(Text2Video {
        model_name: params.string_or("model", DEFAULT_VIDEO_MODEL)?,
        prompt: params.required_string("prompt")?,
        mode: params.choice("mode", VIDEO_MODES, "std")?,
        duration: params.choice("duration", VIDEO_DURATIONS, "5")?,
        negative_prompt: params.string("negativePrompt")?,
        cfg_scale: params.number("cfgScale", 0.0..=1.0)?,
        aspect_ratio: params.string("aspectRatio")?,
        callback_url: params.string("callbackUrl")?,
        external_task_id: params.string("externalTaskId")?,
    })))
}

fn parse_image2video(params: &ParamMap<'_>) -> Result<Operation> {
    Ok(Operation::Video(VideoOperation::Image2Video(Image2Video {
        model_name: params.string_or("model", DEFAULT_VIDEO_MODEL)?,
        mode: params.choice("mode", VIDEO_MODES, "std")?,
        image: params.required_string("image")?,
        duration: params.choice("duration", VIDEO_DURATIONS, "5")?,
        prompt: params.string("prompt")?,
        image_tail: params.string("imageTail")?,
        negative_prompt: params.string("negativePrompt")?,
        cfg_scale: params.number("cfgScale", 0.0..=1.0)?,
        callback_url: params.string("callbackUrl")?,
        external_task_id: params.string("externalTaskId")?,
    })))
}

fn parse_lip_sync(params: &ParamMap<'_>) -> Result<Operation> {
    let input = params.required_object("input")?;

    let video_id = input.string("videoId")?;
    let video_url = input.string("videoUrl")?;
    if video_id.is_none() && video_url.is_none() {
        return Err(Error::InvalidParameterCombination(
            "Either Video ID or Video URL must be provided".to_string(),
        ));
    }

    let mut lip_sync = LipSyncInput {
        video_id,
        video_url,
        mode: LipSyncMode::Text,
        text: None,
        voice_id: None,
        voice_language: None,
        voice_speed: None,
        audio_type: None,
        audio_file: None,
        audio_url: None,
    };

    match input
        .choice("mode", &["text2video", "audio2video"], "text2video")?
        .as_str()
    {
        "audio2video" => {
            lip_sync.mode = LipSyncMode::Audio;
            let audio_type = input.choice("audioType", AUDIO_TYPES, "url")?;
            if audio_type == "file" {
                lip_sync.audio_file = Some(input.required_string("audioFile")?);
            } else {
                lip_sync.audio_url = Some(input.required_string("audioUrl")?);
            }
            lip_sync.audio_type = Some(audio_type);
        }
        _ => {
            lip_sync.text = Some(input.required_string("text")?);
            lip_sync.voice_id = Some(input.required_string("voiceId")?);
            lip_sync.voice_language = Some(input.choice("voiceLanguage", VOICE_LANGUAGES, "zh")?);
            lip_sync.voice_speed = Some(input.number("voiceSpeed", 0.8..=2.0)?.unwrap_or(1.0));
        }
    }

    Ok(Operation::Video(VideoOperation::LipSync(LipSync {
        input: lip_sync,
        callback_url: params.string("callbackUrl")?,
    })))
}

fn parse_video_get(params: &ParamMap<'_>) -> Result<Operation> {
    let video_type = VideoType::from_params(params)?;
    let id = params
        .first_string(&["taskId", "externalTaskId"])?
        .ok_or_else(|| {
            Error::InvalidParameterCombination(
                "Either Task ID or External Task ID must be provided".to_string(),
            )
        })?;

    Ok(Operation::Video(VideoOperation::Get(VideoLookup {
        video_type,
        task_id: checked_task_id("taskId", id)?,
    })))
}

fn parse_video_list(params: &ParamMap<'_>) -> Result<Operation> {
    Ok(Operation::Video(VideoOperation::List(VideoList {
        video_type: VideoType::from_params(params)?,
        page: Page::from_params(params)?,
    })))
}

fn parse_try_on_create(params: &ParamMap<'_>) -> Result<Operation> {
    Ok(Operation::TryOn(TryOnOperation::Create(TryOnCreate {
        model_name: params.string_or("model", DEFAULT_TRY_ON_MODEL)?,
        human_image: params.required_string("humanImage")?,
        cloth_image: params.required_string("clothImage")?,
        callback_url: params.string("callbackUrl")?,
    })))
}

fn parse_try_on_get(params: &ParamMap<'_>) -> Result<Operation> {
    Ok(Operation::TryOn(TryOnOperation::Get(TaskLookup {
        task_id: checked_task_id("taskId", params.required_string("taskId")?)?,
    })))
}

fn parse_try_on_list(params: &ParamMap<'_>) -> Result<Operation> {
    Ok(Operation::TryOn(TryOnOperation::List(Page::from_params(
        params,
    )?)))
}

fn parse_cost_query(params: &ParamMap<'_>) -> Result<Operation> {
    let start_time = params.required_integer("startTime", 0..=i64::MAX)?;
    let end_time = params.required_integer("endTime", 0..=i64::MAX)?;
    if end_time < start_time {
        return Err(Error::InvalidParameterCombination(
            "End time must not be before start time".to_string(),
        ));
    }

    Ok(Operation::Account(AccountOperation::GetResourcePackages(
        CostQuery {
            start_time,
            end_time,
            resource_pack_name: params.string("resourcePackName")?,
        },
    )))
}
