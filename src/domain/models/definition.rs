// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::config::settings::ScraperSettings;
use crate::domain::models::profile::Profile;
use crate::domain::selectors::{SelectorConfig, SelectorList};
use crate::pipeline::{ScrapeMode, Scraper, ScrapingPipeline, Step};
use crate::utils::errors::{DefinitionError, PipelineError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use validator::{Validate, ValidationError};

fn default_burst_rate() -> usize {
    2
}

/// 档案定义
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ProfileDefinition {
    #[validate(length(min = 1, max = 100))]
    pub name: String,

    #[serde(default = "default_burst_rate")]
    #[validate(range(min = 1))]
    pub burst_rate: usize,

    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    #[serde(default)]
    pub cookies: BTreeMap<String, String>,
}

/// 步骤定义
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StepDefinition {
    #[validate(length(min = 1, max = 30))]
    pub name: String,

    #[serde(default)]
    pub mode: ScrapeMode,

    #[serde(default)]
    pub initial_url: Option<String>,

    #[serde(default)]
    #[validate(nested)]
    pub selectors: Vec<SelectorConfig>,
}

/// 流水线定义
///
/// 控制面加载的YAML形式，描述档案、步骤与选择器。
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_steps"))]
pub struct PipelineDefinition {
    #[validate(nested)]
    pub profile: ProfileDefinition,

    #[validate(nested)]
    pub steps: Vec<StepDefinition>,
}

fn validate_steps(definition: &PipelineDefinition) -> Result<(), ValidationError> {
    let Some(first) = definition.steps.first() else {
        return Err(ValidationError::new("steps_empty"));
    };
    if first.initial_url.as_deref().map_or(true, |url| url.trim().is_empty()) {
        return Err(ValidationError::new("initial_url_missing"));
    }

    let mut step_names = HashSet::new();
    for step in &definition.steps {
        if !step_names.insert(step.name.as_str()) {
            return Err(ValidationError::new("duplicate_step_name"));
        }
        let mut selector_names = HashSet::new();
        if !step
            .selectors
            .iter()
            .all(|s| selector_names.insert(s.name.as_str()))
        {
            return Err(ValidationError::new("duplicate_selector_name"));
        }
    }
    Ok(())
}

impl PipelineDefinition {
    /// 从YAML文本解析并校验
    pub fn from_yaml(raw: &str) -> Result<Self, DefinitionError> {
        let definition: PipelineDefinition = serde_yaml::from_str(raw)?;
        definition.validate()?;
        Ok(definition)
    }

    /// 从文件解析并校验
    pub fn from_file(path: &Path) -> Result<Self, DefinitionError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml(&raw)
    }

    /// 构建运行时流水线
    ///
    /// 选择器在这里预编译一次，指令错误在提交前暴露。
    ///
    /// # 参数
    ///
    /// * `settings` - 抓取配置
    ///
    /// # 返回值
    ///
    /// * `Ok(ScrapingPipeline)` - 可提交给引擎的流水线
    /// * `Err(DefinitionError)` - 校验、选择器或HTTP客户端构建失败
    pub fn into_pipeline(self, settings: &ScraperSettings) -> Result<ScrapingPipeline, DefinitionError> {
        self.validate()?;
        let profile = Arc::new(
            Profile::new(self.profile.name, self.profile.burst_rate)
                .with_headers(self.profile.headers)
                .with_cookies(self.profile.cookies),
        );

        let mut steps: Vec<Arc<dyn Step>> = Vec::with_capacity(self.steps.len());
        for (order, step) in self.steps.into_iter().enumerate() {
            SelectorList::compile(&step.selectors)?;
            let mut scraper = Scraper::new(&profile, step.name, order, step.selectors, settings)
                .map_err(PipelineError::from)?
                .with_mode(step.mode);
            if let Some(url) = step.initial_url {
                scraper = scraper.with_initial_url(url);
            }
            steps.push(Arc::new(scraper));
        }
        debug!(pipeline = %profile.name, "Built {} steps", steps.len());
        Ok(ScrapingPipeline::new(profile, steps))
    }
}

/// 加载目录中的全部流水线定义
///
/// 读取 `.yaml` 与 `.yml` 文件，按文件名排序。任一文件无效即返回错误。
pub fn load_definitions(directory: &Path) -> Result<Vec<(PathBuf, PipelineDefinition)>, DefinitionError> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(directory)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && matches!(
                    path.extension().and_then(|e| e.to_str()),
                    Some("yaml") | Some("yml")
                )
        })
        .collect();
    paths.sort();

    let mut definitions = Vec::with_capacity(paths.len());
    for path in paths {
        let definition = PipelineDefinition::from_file(&path)?;
        info!("Loaded pipeline `{}` from {}", definition.profile.name, path.display());
        definitions.push((path, definition));
    }
    Ok(definitions)
}
