use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

use crate::batch::TaskElement;
use crate::model::TGFile;
use crate::naming;
use crate::rename::RenameService;
use crate::rule::DirPath;
use storage::{join_path, Storage};

/// 规则解析后的单个文件: 存储与目录已确定
pub struct RoutedFile {
    pub file: TGFile,
    pub storage: Arc<dyn Storage>,
    pub dir: DirPath,
}

/// 把一次提交的文件装配成批量任务元素
///
/// 目录为字面值的文件直接入列; NEW-FOR-ALBUM 的文件按 grouped_id
/// 分桶, 桶内统一命名并共享目录与存储。桶只在本次提交内闭合,
/// 不会跨提交保留。
pub async fn assemble_elements(
    rename: &RenameService,
    routed: Vec<RoutedFile>,
) -> Vec<TaskElement> {
    let mut elements = Vec::with_capacity(routed.len());
    let mut album_buckets: BTreeMap<i64, Vec<RoutedFile>> = BTreeMap::new();

    for item in routed {
        if !item.dir.is_new_for_album() {
            let path = item
                .storage
                .join_storage_path(&join_path(item.dir.literal(), &item.file.display_name()));
            elements.push(TaskElement {
                storage: item.storage,
                storage_path: path,
                file: item.file,
            });
            continue;
        }

        match item.file.grouped_id {
            Some(group_id) if group_id != 0 => {
                album_buckets.entry(group_id).or_default().push(item);
            }
            _ => {
                warn!(
                    "文件 {} 不属于任何相册, 跳过相册目录处理",
                    item.file.display_name()
                );
            }
        }
    }

    for (group_id, bucket) in album_buckets {
        if bucket.len() < 2 {
            // 单文件的"相册"没有统一命名的意义, 按普通文件落在存储根下
            warn!("相册分组 {} 只有一个文件, 按普通文件处理", group_id);
            for item in bucket {
                let path = item
                    .storage
                    .join_storage_path(&join_path("", &item.file.display_name()));
                elements.push(TaskElement {
                    storage: item.storage,
                    storage_path: path,
                    file: item.file,
                });
            }
            continue;
        }

        let files: Vec<&TGFile> = bucket.iter().map(|item| &item.file).collect();
        let filenames = naming::generate_album_filenames(rename, &files).await;

        // 相册目录取第一个生成名的主干, 保证目录与文件名一致
        let album_dir = naming::album_dir_from_filename(&filenames[0]);
        let final_dir = match &bucket[0].dir {
            DirPath::NewForAlbum => album_dir,
            DirPath::Literal(configured) => join_path(configured, &album_dir),
        };

        // 整组使用第一个文件解析出的存储
        let album_storage = bucket[0].storage.clone();
        for (item, filename) in bucket.into_iter().zip(filenames) {
            let path = album_storage.join_storage_path(&join_path(&final_dir, &filename));
            elements.push(TaskElement {
                storage: album_storage.clone(),
                storage_path: path,
                file: item.file,
            });
        }
    }

    elements
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MediaKind;
    use crate::tftask::tests::{test_file, SinkStorage};

    fn routed(
        storage: &Arc<SinkStorage>,
        name: &str,
        dir: DirPath,
        grouped_id: Option<i64>,
    ) -> RoutedFile {
        let mut file = test_file(name, 10);
        file.grouped_id = grouped_id;
        file.message_text = "trip".to_string();
        if name.ends_with(".jpg") {
            file.kind = MediaKind::Photo;
        }
        RoutedFile {
            file,
            storage: storage.clone(),
            dir,
        }
    }

    #[tokio::test]
    async fn test_direct_elements_keep_literal_dir() {
        let storage = SinkStorage::new(false);
        let rename = RenameService::disabled();

        let elements = assemble_elements(
            &rename,
            vec![routed(
                &storage,
                "clip.mp4",
                DirPath::Literal("/video".to_string()),
                Some(7),
            )],
        )
        .await;

        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].storage_path, "/sink/video/clip.mp4");
    }

    #[tokio::test]
    async fn test_album_bucket_unified_naming() {
        let storage = SinkStorage::new(false);
        let rename = RenameService::disabled();

        let elements = assemble_elements(
            &rename,
            vec![
                routed(&storage, "a.jpg", DirPath::NewForAlbum, Some(7)),
                routed(&storage, "b.jpg", DirPath::NewForAlbum, Some(7)),
                routed(&storage, "c.mp4", DirPath::NewForAlbum, Some(7)),
            ],
        )
        .await;

        let paths: Vec<&str> = elements.iter().map(|e| e.storage_path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "/sink/trip/trip_01.jpg",
                "/sink/trip/trip_02.jpg",
                "/sink/trip/trip_03.mp4",
            ]
        );
    }

    #[tokio::test]
    async fn test_ungrouped_new_for_album_skipped() {
        let storage = SinkStorage::new(false);
        let rename = RenameService::disabled();

        let elements = assemble_elements(
            &rename,
            vec![
                routed(&storage, "solo.jpg", DirPath::NewForAlbum, None),
                routed(&storage, "zero.jpg", DirPath::NewForAlbum, Some(0)),
            ],
        )
        .await;
        assert!(elements.is_empty());
    }

    #[tokio::test]
    async fn test_single_member_bucket_degrades() {
        let storage = SinkStorage::new(false);
        let rename = RenameService::disabled();

        let elements = assemble_elements(
            &rename,
            vec![routed(&storage, "one.jpg", DirPath::NewForAlbum, Some(9))],
        )
        .await;
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].storage_path, "/sink/one.jpg");
    }

    #[tokio::test]
    async fn test_multiple_buckets_separate_dirs() {
        let storage = SinkStorage::new(false);
        let rename = RenameService::disabled();

        let mut routed_files = vec![
            routed(&storage, "a.jpg", DirPath::NewForAlbum, Some(1)),
            routed(&storage, "b.jpg", DirPath::NewForAlbum, Some(1)),
            routed(&storage, "c.jpg", DirPath::NewForAlbum, Some(2)),
            routed(&storage, "d.jpg", DirPath::NewForAlbum, Some(2)),
        ];
        // 第二个相册的消息文本不同, 目录应当独立
        routed_files[2].file.message_text = "city".to_string();
        routed_files[3].file.message_text = "city".to_string();

        let elements = assemble_elements(&rename, routed_files).await;
        assert_eq!(elements.len(), 4);
        assert!(elements[0].storage_path.starts_with("/sink/trip/"));
        assert!(elements[2].storage_path.starts_with("/sink/city/"));
    }
}
