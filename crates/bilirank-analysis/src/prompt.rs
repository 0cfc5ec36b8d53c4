//! Prompt text for every model call.

use std::fmt::Write as _;

use bilirank_core::{CommentInput, Dimension};

fn dimension_list(dimensions: &[Dimension]) -> String {
    dimensions
        .iter()
        .map(|d| format!("- {}：{}", d.name, d.description))
        .collect::<Vec<_>>()
        .join("\n")
}

fn join_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "无".to_string()
    } else {
        items.join("、")
    }
}

pub(crate) fn single_comment_system(dimensions: &[Dimension]) -> String {
    format!(
        r#"你是一个专业的商品评论分析助手。你的任务是：

1. 从视频标题和评论内容中识别：
   - 品牌名称（如"戴森"、"小米"、"苹果"、"Sony"）
   - 具体型号（如"V12"、"iPhone 15 Pro"、"G10"、"WH-1000XM5"）

型号提取规则：
- 优先从评论内容中提取具体型号（评论比标题更准确）
- 常见型号格式：字母+数字组合（V12, G10, S23）、品牌+型号（iPhone 15, Galaxy S23）、系列+后缀（Pro, Max, Plus, Ultra, Lite）
- 如果评论提到多个型号，选择评论主要讨论的那个
- 注意区分型号和代数（"第二代"不是型号，"V2"才是）

2. 对以下维度进行打分（1-10分）：
{dims}

评分标准：
- 1-3分：差评/负面评价
- 4-5分：一般/中性评价
- 6-7分：较好/正面评价
- 8-10分：优秀/强烈好评

重要规则：
1. 必须从评论内容中提取品牌（视频标题仅供参考上下文）
2. 品牌必须是单一品牌名称，不能包含"/"或其他分隔符
3. 如果评论同时讨论多个品牌且无法确定主要品牌，brand填"未知"
4. 型号必须是具体型号名，不能是描述性文字（如"新款"、"基础款"）
5. 无法确定型号填"通用"，无法确定品牌填"未知"
6. 只根据评论中明确提及的内容打分，未提及的维度返回null
7. 必须严格返回JSON格式，不要添加任何其他文字

返回JSON格式：
{{"brand":"品牌名","model":"型号名","scores":{{"维度1":8.5,"维度2":null}}}}"#,
        dims = dimension_list(dimensions)
    )
}

pub(crate) fn single_comment_user(input: &CommentInput) -> String {
    if input.video_title.is_empty() {
        format!("评论内容：{}", input.content)
    } else {
        format!("视频标题：{}\n\n评论内容：{}", input.video_title, input.content)
    }
}

pub(crate) fn merged_batch_system(dimensions: &[Dimension]) -> String {
    format!(
        r#"你是商品评论分析助手。分析以下多条评论，为每条评论：
1. 提取品牌名称和具体型号
2. 对以下维度打分（1-10分，未提及则为null）：
{dims}

评分标准：1-3差评，4-5一般，6-7较好，8-10优秀

重要规则：
- 每条评论独立分析，用评论编号[1][2]等标识
- 品牌必须是单一品牌名称，绝对不能包含"/"或其他分隔符
- 如果评论对比多个品牌（如"A比B好"），只提取评论主要评价的那个品牌
- 如果评论同时讨论多个品牌且无法确定主要品牌，brand填"未知"
- 型号必须是具体型号名（如"V12"、"Max"、"Pro"），不能是描述性文字（如"新款"、"基础款"）
- 无法确定品牌填"未知"，无法确定型号填"通用"
- 必须返回JSON格式，不要添加任何其他文字
- results数组的顺序必须与输入评论顺序一致

返回格式：
{{"results":[{{"id":"1","brand":"品牌","model":"型号","scores":{{"维度1":8.5,"维度2":null}}}},{{"id":"2",...}}]}}"#,
        dims = dimension_list(dimensions)
    )
}

pub(crate) fn merged_batch_user(inputs: &[CommentInput]) -> String {
    let mut out = format!("评论列表（共{}条）：", inputs.len());
    for (i, input) in inputs.iter().enumerate() {
        let n = i + 1;
        if input.video_title.is_empty() {
            let _ = write!(out, "\n[{n}] 内容：{}", input.content);
        } else {
            let _ = write!(out, "\n[{n}] 视频：{} | 内容：{}", input.video_title, input.content);
        }
    }
    out
}

pub(crate) fn brand_identify_system(
    category: &str,
    known_brands: &[String],
    discovered_brands: &[String],
) -> String {
    format!(
        r#"你是一个专业的【{category}】产品型号识别专家。

## 任务背景
- 商品类别：{category}
- 用户关注的品牌：{known}
- 已识别到的同类品牌：{discovered}

## 识别规则
1. **优先匹配**：如果型号明显属于已知品牌或已识别品牌，直接返回该品牌
2. **行业推断**：根据商品类别和已知品牌，推断该行业的其他常见品牌
3. **命名规律**：分析型号的命名规律（如前缀、系列名）来判断品牌
4. **品牌格式**：
   - 纯字母品牌用全大写（如 OPPO、CATLINK、JBL）
   - 中文品牌保持原样（如 小米、华为、小佩）
5. **无法确定**：如果确实无法判断，返回"未知"

## 重要提示
- 这是【{category}】行业的型号，请在该行业范围内识别
- 同一型号在不同行业可能属于不同品牌，请根据上下文判断
- 必须严格返回JSON格式"#,
        known = join_or_none(known_brands),
        discovered = join_or_none(discovered_brands),
    )
}

pub(crate) fn brand_identify_user(models: &[String]) -> String {
    format!(
        r#"请识别以下型号对应的品牌，返回JSON格式：

型号列表：
{}

返回格式示例：
{{"results": {{"TWS5": "OPPO", "Air 2": "小米", "V12": "戴森"}}}}"#,
        models.join("\n")
    )
}

pub(crate) const RECOMMENDATION_SYSTEM: &str = "你是一位专业的商品评测专家。请根据以下品牌评分和优劣势分析，生成一段200-300字的专业购买建议。
要求：
1. 客观分析各品牌的优缺点
2. 针对不同用户需求给出具体建议
3. 语言专业但易懂
4. 使用Markdown格式输出，包括：
   - 使用 ## 作为小标题
   - 使用 **加粗** 强调重点
   - 使用 - 列表展示要点
   - 使用 > 引用块突出关键建议";
