// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 将序列切分为固定大小的批次
///
/// 除最后一个批次外，每个批次恰好包含 `size` 个元素；空的尾部余数不会产生额外批次。
/// 空输入返回一个空批次，调用方据此仍能得到一次（空的）处理轮次。
///
/// # 参数
///
/// * `items` - 待切分的元素
/// * `size` - 批次大小，为0时按1处理
///
/// # 返回值
///
/// 保持原始顺序的批次列表
pub fn to_batches<T: Clone>(items: &[T], size: usize) -> Vec<Vec<T>> {
    let size = size.max(1);
    if items.len() <= size {
        return vec![items.to_vec()];
    }
    items.chunks(size).map(<[T]>::to_vec).collect()
}
