use sqlx::PgPool;

use crate::models::knowledge::{ArticleInput, ArticleListQuery, KnowledgeArticle};

pub struct KnowledgeService;

impl KnowledgeService {
    /// Lowercase ASCII slug: alphanumerics kept, every other run collapses
    /// to a single hyphen, no leading/trailing hyphen.
    pub fn slugify(title: &str) -> String {
        let mut slug = String::with_capacity(title.len());
        let mut pending_hyphen = false;
        for c in title.chars() {
            if c.is_ascii_alphanumeric() {
                if pending_hyphen && !slug.is_empty() {
                    slug.push('-');
                }
                pending_hyphen = false;
                slug.push(c.to_ascii_lowercase());
            } else {
                pending_hyphen = true;
            }
        }
        if slug.is_empty() {
            slug.push_str("article");
        }
        slug
    }

    /// Appends -1, -2, ... until the slug is free. `exclude_id` skips the
    /// article being updated so it can keep its own slug.
    async fn unique_slug(
        db: &PgPool,
        base: &str,
        exclude_id: Option<i64>,
    ) -> anyhow::Result<String> {
        let mut candidate = base.to_owned();
        let mut n = 0;
        loop {
            let (taken,): (bool,) = sqlx::query_as(
                "SELECT EXISTS(
                     SELECT 1 FROM knowledge_base
                     WHERE slug = $1 AND ($2::bigint IS NULL OR id <> $2)
                 )",
            )
            .bind(&candidate)
            .bind(exclude_id)
            .fetch_one(db)
            .await?;
            if !taken {
                return Ok(candidate);
            }
            n += 1;
            candidate = format!("{base}-{n}");
        }
    }

    pub async fn create(
        db: &PgPool,
        input: &ArticleInput,
        created_by: i64,
    ) -> anyhow::Result<KnowledgeArticle> {
        let base = match &input.slug {
            Some(s) if !s.trim().is_empty() => Self::slugify(s),
            _ => Self::slugify(&input.title),
        };
        let slug = Self::unique_slug(db, &base, None).await?;
        let article = sqlx::query_as::<_, KnowledgeArticle>(
            "INSERT INTO knowledge_base (title, slug, content, category, file_path,
                                         is_published, created_by)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING *",
        )
        .bind(&input.title)
        .bind(&slug)
        .bind(&input.content)
        .bind(&input.category)
        .bind(input.file_path.as_deref())
        .bind(input.is_published)
        .bind(created_by)
        .fetch_one(db)
        .await?;
        Ok(article)
    }

    pub async fn update(
        db: &PgPool,
        id: i64,
        input: &ArticleInput,
    ) -> anyhow::Result<Option<KnowledgeArticle>> {
        let base = match &input.slug {
            Some(s) if !s.trim().is_empty() => Self::slugify(s),
            _ => Self::slugify(&input.title),
        };
        let slug = Self::unique_slug(db, &base, Some(id)).await?;
        let article = sqlx::query_as::<_, KnowledgeArticle>(
            "UPDATE knowledge_base SET
                 title = $1, slug = $2, content = $3, category = $4,
                 file_path = COALESCE($5, file_path),
                 is_published = $6, updated_at = NOW()
             WHERE id = $7
             RETURNING *",
        )
        .bind(&input.title)
        .bind(&slug)
        .bind(&input.content)
        .bind(&input.category)
        .bind(input.file_path.as_deref())
        .bind(input.is_published)
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(article)
    }

    pub async fn delete(db: &PgPool, id: i64) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM knowledge_base WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Public listing: published articles only, optional category and text
    /// search, paginated.
    pub async fn list_published(
        db: &PgPool,
        query: &ArticleListQuery,
    ) -> anyhow::Result<(Vec<KnowledgeArticle>, i64)> {
        let page = query.page.unwrap_or(1).max(1);
        let limit = query.page_size.unwrap_or(10).clamp(1, 100);
        let offset = (page - 1) * limit;

        let rows = sqlx::query_as::<_, KnowledgeArticle>(
            "SELECT * FROM knowledge_base
             WHERE is_published = TRUE
               AND ($1::text IS NULL OR category = $1)
               AND ($2::text IS NULL
                    OR title ILIKE '%' || $2 || '%'
                    OR content ILIKE '%' || $2 || '%')
             ORDER BY created_at DESC
             LIMIT $3 OFFSET $4",
        )
        .bind(query.category.as_deref())
        .bind(query.search.as_deref())
        .bind(limit)
        .bind(offset)
        .fetch_all(db)
        .await?;

        let (total,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM knowledge_base
             WHERE is_published = TRUE
               AND ($1::text IS NULL OR category = $1)
               AND ($2::text IS NULL
                    OR title ILIKE '%' || $2 || '%'
                    OR content ILIKE '%' || $2 || '%')",
        )
        .bind(query.category.as_deref())
        .bind(query.search.as_deref())
        .fetch_one(db)
        .await?;

        Ok((rows, total))
    }

    /// Admin listing includes drafts, with the same filters as the public one.
    pub async fn list_all(
        db: &PgPool,
        query: &ArticleListQuery,
    ) -> anyhow::Result<(Vec<KnowledgeArticle>, i64)> {
        let page = query.page.unwrap_or(1).max(1);
        let limit = query.page_size.unwrap_or(10).clamp(1, 100);
        let offset = (page - 1) * limit;

        let rows = sqlx::query_as::<_, KnowledgeArticle>(
            "SELECT * FROM knowledge_base
             WHERE ($1::text IS NULL OR category = $1)
               AND ($2::text IS NULL
                    OR title ILIKE '%' || $2 || '%'
                    OR content ILIKE '%' || $2 || '%')
             ORDER BY created_at DESC
             LIMIT $3 OFFSET $4",
        )
        .bind(query.category.as_deref())
        .bind(query.search.as_deref())
        .bind(limit)
        .bind(offset)
        .fetch_all(db)
        .await?;

        let (total,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM knowledge_base
             WHERE ($1::text IS NULL OR category = $1)
               AND ($2::text IS NULL
                    OR title ILIKE '%' || $2 || '%'
                    OR content ILIKE '%' || $2 || '%')",
        )
        .bind(query.category.as_deref())
        .bind(query.search.as_deref())
        .fetch_one(db)
        .await?;

        Ok((rows, total))
    }

    /// Fetches a published article by slug and bumps its view counter.
    pub async fn view_by_slug(
        db: &PgPool,
        slug: &str,
    ) -> anyhow::Result<Option<KnowledgeArticle>> {
        let article = sqlx::query_as::<_, KnowledgeArticle>(
            "UPDATE knowledge_base SET views = views + 1
             WHERE slug = $1 AND is_published = TRUE
             RETURNING *",
        )
        .bind(slug)
        .fetch_optional(db)
        .await?;
        Ok(article)
    }

    pub async fn find(db: &PgPool, id: i64) -> anyhow::Result<Option<KnowledgeArticle>> {
        let article = sqlx::query_as::<_, KnowledgeArticle>(
            "SELECT * FROM knowledge_base WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(article)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_collapses_and_lowercases() {
        assert_eq!(KnowledgeService::slugify("Hello World"), "hello-world");
        assert_eq!(KnowledgeService::slugify("  How to -- reset?! "), "how-to-reset");
        assert_eq!(KnowledgeService::slugify("FAQ: VPN & 2FA"), "faq-vpn-2fa");
        assert_eq!(KnowledgeService::slugify("***"), "article");
    }
}
