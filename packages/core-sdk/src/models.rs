use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ConvertError;

/** \brief 单次转换允许的最大输入字数，由调用方（CLI / HTTP 服务）校验。 */
pub const MAX_INPUT_CHARS: usize = 500;

/** \brief 历史记录最多保留的条数。 */
pub const HISTORY_LIMIT: usize = 50;

/**
 * \brief 支持的模型服务，集合固定。
 */
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    #[default]
    OpenAI,
    Qianwen,
    Wenxin,
    Deepseek,
}

impl ProviderId {
    /** \brief 全部 Provider，按界面展示顺序排列。 */
    pub const ALL: [ProviderId; 4] = [
        ProviderId::OpenAI,
        ProviderId::Qianwen,
        ProviderId::Wenxin,
        ProviderId::Deepseek,
    ];

    /**
     * \brief 小写标识符，与存储和接口中使用的一致。
     */
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenAI => "openai",
            ProviderId::Qianwen => "qianwen",
            ProviderId::Wenxin => "wenxin",
            ProviderId::Deepseek => "deepseek",
        }
    }

    /**
     * \brief 面向界面与历史记录的显示名称。
     */
    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderId::OpenAI => "OpenAI (GPT-4)",
            ProviderId::Qianwen => "通义千问",
            ProviderId::Wenxin => "文心一言",
            ProviderId::Deepseek => "Deepseek",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProviderId::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| ConvertError::UnsupportedProvider(s.to_string()))
    }
}

/**
 * \brief 消息结构，与 OpenAI Chat 消息格式对齐。
 */
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /** \brief 角色：system/user */
    pub role: String,
    /** \brief 内容 */
    pub content: String,
}

/**
 * \brief 五种固定语气，顺序即展示顺序。
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToneCategory {
    Tactful,
    Professional,
    Harmonious,
    Humorous,
    Serious,
}

impl ToneCategory {
    pub const ALL: [ToneCategory; 5] = [
        ToneCategory::Tactful,
        ToneCategory::Professional,
        ToneCategory::Harmonious,
        ToneCategory::Humorous,
        ToneCategory::Serious,
    ];

    /** \brief 模型回复中使用的 JSON 键名。 */
    pub fn label(&self) -> &'static str {
        match self {
            ToneCategory::Tactful => "委婉礼貌",
            ToneCategory::Professional => "专业正式",
            ToneCategory::Harmonious => "友好和谐",
            ToneCategory::Humorous => "幽默风趣",
            ToneCategory::Serious => "严肃认真",
        }
    }
}

/**
 * \brief 一次成功转换的结果：五种语气各一条改写。
 * \details 序列化为以中文语气名为键的 JSON 对象，键顺序与 `ToneCategory::ALL` 一致。
 */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToneResult {
    #[serde(rename = "委婉礼貌")]
    pub tactful: String,
    #[serde(rename = "专业正式")]
    pub professional: String,
    #[serde(rename = "友好和谐")]
    pub harmonious: String,
    #[serde(rename = "幽默风趣")]
    pub humorous: String,
    #[serde(rename = "严肃认真")]
    pub serious: String,
}

impl ToneResult {
    pub fn get(&self, category: ToneCategory) -> &str {
        match category {
            ToneCategory::Tactful => &self.tactful,
            ToneCategory::Professional => &self.professional,
            ToneCategory::Harmonious => &self.harmonious,
            ToneCategory::Humorous => &self.humorous,
            ToneCategory::Serious => &self.serious,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ToneCategory, &str)> + '_ {
        ToneCategory::ALL.into_iter().map(move |c| (c, self.get(c)))
    }

    /**
     * \brief 从模型回复的 JSON 对象构造结果。
     * \return 缺少的语气键（或对应值不是字符串）时返回这些键名。多余的键被忽略。
     */
    pub fn from_map(map: &Map<String, Value>) -> Result<Self, Vec<&'static str>> {
        let mut missing = Vec::new();
        let mut pick = |category: ToneCategory| -> String {
            match map.get(category.label()).and_then(Value::as_str) {
                Some(text) => text.to_string(),
                None => {
                    missing.push(category.label());
                    String::new()
                }
            }
        };
        let result = ToneResult {
            tactful: pick(ToneCategory::Tactful),
            professional: pick(ToneCategory::Professional),
            harmonious: pick(ToneCategory::Harmonious),
            humorous: pick(ToneCategory::Humorous),
            serious: pick(ToneCategory::Serious),
        };
        if missing.is_empty() {
            Ok(result)
        } else {
            Err(missing)
        }
    }
}

/**
 * \brief 一次转换请求。仅在调用期间存在，不做持久化。
 */
#[derive(Clone)]
pub struct ConversionRequest {
    /** \brief Provider 标识符（未经校验）。 */
    pub provider: String,
    /** \brief API Key 或 access token。 */
    pub credential: String,
    /** \brief 用户输入的气话。 */
    pub user_text: String,
}

impl fmt::Debug for ConversionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionRequest")
            .field("provider", &self.provider)
            .field("credential", &"<redacted>")
            .field("user_text", &self.user_text)
            .finish()
    }
}

/**
 * \brief 历史记录条目。
 */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /** \brief 自增主键 */
    pub id: i64,
    /** \brief 原始输入 */
    pub input: String,
    pub results: ToneResult,
    pub provider: ProviderId,
    /** \brief Unix 毫秒时间戳 */
    pub timestamp: i64,
}
