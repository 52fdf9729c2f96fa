//! 依赖图构建和拓扑排序
//!
//! 分析 Pass 之间的资源依赖关系，构建 DAG 并进行拓扑排序。

use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// 依赖边：从 producer 到 consumer
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DependencyEdge {
    /// 生产者 Pass 索引
    pub producer: usize,
    /// 消费者 Pass 索引
    pub consumer: usize,
    /// 产生这条边的资源索引
    pub resources: Vec<usize>,
}

/// 依赖图
///
/// Pass 索引就是声明顺序，拓扑排序时用它打破平局。
#[derive(Clone, Debug)]
pub struct DependencyGraph {
    pass_count: usize,
    /// 邻接表（出边）
    adjacency: Vec<Vec<usize>>,
    in_degrees: Vec<usize>,
    edges: Vec<DependencyEdge>,
}

impl DependencyGraph {
    pub fn new(pass_count: usize) -> Self {
        Self {
            pass_count,
            adjacency: vec![Vec::new(); pass_count],
            in_degrees: vec![0; pass_count],
            edges: Vec::new(),
        }
    }

    /// 添加依赖边，同一对 pass 之间只保留一条边
    pub fn add_edge(&mut self, producer: usize, consumer: usize, resource: usize) {
        if producer == consumer {
            return;
        }

        if let Some(edge) = self.edges.iter_mut().find(|e| e.producer == producer && e.consumer == consumer) {
            if !edge.resources.contains(&resource) {
                edge.resources.push(resource);
            }
            return;
        }

        self.adjacency[producer].push(consumer);
        self.in_degrees[consumer] += 1;
        self.edges.push(DependencyEdge {
            producer,
            consumer,
            resources: vec![resource],
        });
    }

    /// Kahn 拓扑排序，多个 pass 同时就绪时先执行声明靠前的
    ///
    /// # 返回
    /// - `Ok(order)`: 拓扑排序后的 Pass 索引列表
    /// - `Err(cycle)`: 检测到循环依赖，返回无法排序的 Pass 索引
    pub fn topological_sort(&self) -> Result<Vec<usize>, Vec<usize>> {
        let mut in_degrees = self.in_degrees.clone();
        let mut ready: BinaryHeap<Reverse<usize>> =
            (0..self.pass_count).filter(|&i| in_degrees[i] == 0).map(Reverse).collect();
        let mut result = Vec::with_capacity(self.pass_count);

        while let Some(Reverse(node)) = ready.pop() {
            result.push(node);

            for &neighbor in &self.adjacency[node] {
                in_degrees[neighbor] -= 1;
                if in_degrees[neighbor] == 0 {
                    ready.push(Reverse(neighbor));
                }
            }
        }

        if result.len() != self.pass_count {
            let remaining: Vec<usize> = (0..self.pass_count).filter(|&i| in_degrees[i] > 0).collect();
            Err(remaining)
        } else {
            Ok(result)
        }
    }

    /// 获取 Pass 的直接依赖（前驱）
    pub fn get_predecessors(&self, pass_index: usize) -> Vec<usize> {
        self.edges.iter().filter(|e| e.consumer == pass_index).map(|e| e.producer).collect()
    }

    #[inline]
    pub fn get_successors(&self, pass_index: usize) -> &[usize] {
        &self.adjacency[pass_index]
    }

    #[inline]
    pub fn edges(&self) -> &[DependencyEdge] {
        &self.edges
    }
}

/// 依赖分析的结果
pub struct DependencyAnalysis {
    pub graph: DependencyGraph,
    /// 每个资源按声明顺序的最后一个写入者
    pub last_producer: Vec<Option<usize>>,
}

/// 依赖分析器
///
/// 从 Pass 的读写列表构建依赖图。
pub struct DependencyAnalyzer;

impl DependencyAnalyzer {
    /// 规则（按声明顺序遍历）：
    /// - 同一资源的多个写入者串成一条链（WAW）
    /// - 读取者依赖在它之前声明的最近一个写入者（RAW）
    /// - 写入者依赖上一次写入之后的所有读取者（WAR）
    /// - 在任何写入者之前声明的读取者，依赖整个 graph 中最后的写入者
    ///
    /// 最后一条规则让读取者可能依赖一个声明在它之后的 pass，
    /// 这也是循环依赖能够出现的原因。
    pub fn analyze(
        resource_count: usize,
        reads: &[Vec<usize>],  // pass_index -> [resource]
        writes: &[Vec<usize>], // pass_index -> [resource]
    ) -> DependencyAnalysis {
        let pass_count = reads.len();
        let mut graph = DependencyGraph::new(pass_count);

        let mut last_producer: Vec<Option<usize>> = vec![None; resource_count];
        for (pass_idx, pass_writes) in writes.iter().enumerate() {
            for &res in pass_writes {
                last_producer[res] = Some(pass_idx);
            }
        }

        let mut last_writer: Vec<Option<usize>> = vec![None; resource_count];
        let mut readers_since_write: Vec<Vec<usize>> = vec![Vec::new(); resource_count];
        for pass_idx in 0..pass_count {
            for &res in &reads[pass_idx] {
                match last_writer[res] {
                    Some(writer) => {
                        graph.add_edge(writer, pass_idx, res);
                        readers_since_write[res].push(pass_idx);
                    }
                    None => {
                        if let Some(producer) = last_producer[res] {
                            graph.add_edge(producer, pass_idx, res);
                        }
                    }
                }
            }

            for &res in &writes[pass_idx] {
                if let Some(writer) = last_writer[res] {
                    graph.add_edge(writer, pass_idx, res);
                }
                for reader in std::mem::take(&mut readers_since_write[res]) {
                    graph.add_edge(reader, pass_idx, res);
                }
                last_writer[res] = Some(pass_idx);
            }
        }

        DependencyAnalysis { graph, last_producer }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_dependency() {
        // Pass 0 写入资源 0，Pass 1 读取资源 0
        let analysis = DependencyAnalyzer::analyze(1, &[vec![], vec![0]], &[vec![0], vec![]]);

        assert_eq!(analysis.graph.topological_sort().unwrap(), vec![0, 1]);
        assert_eq!(analysis.last_producer, vec![Some(0)]);
        assert_eq!(analysis.graph.get_predecessors(1), vec![0]);
    }

    #[test]
    fn test_reader_declared_first_runs_after_writer() {
        // Pass 0 读取资源 0，Pass 1 写入资源 0
        let analysis = DependencyAnalyzer::analyze(1, &[vec![0], vec![]], &[vec![], vec![0]]);
        assert_eq!(analysis.graph.topological_sort().unwrap(), vec![1, 0]);
    }

    #[test]
    fn test_independent_passes_keep_declaration_order() {
        // 0、1、2 互不相关，3 读取它们的输出
        let reads = [vec![], vec![], vec![], vec![2, 0, 1]];
        let writes = [vec![0], vec![1], vec![2], vec![]];
        let analysis = DependencyAnalyzer::analyze(3, &reads, &writes);

        assert_eq!(analysis.graph.topological_sort().unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(analysis.graph.get_successors(0), &[3]);
    }

    #[test]
    fn test_writers_are_chained() {
        // 0、1 都写入资源 0，2 读取
        let reads = [vec![], vec![], vec![0]];
        let writes = [vec![0], vec![0], vec![]];
        let analysis = DependencyAnalyzer::analyze(1, &reads, &writes);

        assert_eq!(analysis.graph.topological_sort().unwrap(), vec![0, 1, 2]);
        assert_eq!(analysis.last_producer, vec![Some(1)]);
        assert_eq!(analysis.graph.edges().len(), 2);
    }

    #[test]
    fn test_writer_waits_for_earlier_readers() {
        // 0 写，1、2 读，3 再写
        let reads = [vec![], vec![0], vec![0], vec![]];
        let writes = [vec![0], vec![], vec![], vec![0]];
        let analysis = DependencyAnalyzer::analyze(1, &reads, &writes);

        assert_eq!(analysis.graph.topological_sort().unwrap(), vec![0, 1, 2, 3]);
        let mut preds = analysis.graph.get_predecessors(3);
        preds.sort();
        assert_eq!(preds, vec![0, 1, 2]);
        assert_eq!(analysis.last_producer, vec![Some(3)]);
    }

    #[test]
    fn test_duplicate_edges_are_merged() {
        let reads = [vec![], vec![0, 1]];
        let writes = [vec![0, 1], vec![]];
        let analysis = DependencyAnalyzer::analyze(2, &reads, &writes);

        assert_eq!(
            analysis.graph.edges(),
            &[DependencyEdge {
                producer: 0,
                consumer: 1,
                resources: vec![0, 1],
            }]
        );
    }

    #[test]
    fn test_cycle() {
        // 0 读 2 写 0，1 读 0 写 1，2 读 1 写 2
        let reads = [vec![2], vec![0], vec![1], vec![]];
        let writes = [vec![0], vec![1], vec![2], vec![3]];
        let analysis = DependencyAnalyzer::analyze(4, &reads, &writes);

        assert_eq!(analysis.graph.topological_sort().unwrap_err(), vec![0, 1, 2]);
    }
}
