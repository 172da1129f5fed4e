use diesel::prelude::*;
use thiserror::Error;
use tracing::{event, Level};

use crosstune_core::model::{NewUser, User, UserLogin};
use crosstune_core::schema;

use crate::model::{InternalNewUser, InternalUser};

use super::{DatabaseConnection, DatabaseQueryError};

// User database queries

#[derive(Debug, Error)]
pub enum UserAddVerifyError {
  #[error("Failed to execute a database query")]
  DatabaseQueryFail(#[from] diesel::result::Error),
  #[error("Failed to hash password")]
  PasswordHashFail(#[from] crate::password::HashError),
}

impl DatabaseConnection {
  pub fn list_users(&self) -> Result<Vec<User>, DatabaseQueryError> {
    use schema::user::dsl::*;
    Ok(user.select((id, name)).load::<User>(&self.connection)?)
  }

  pub fn get_user_by_id(&self, input_id: i32) -> Result<Option<User>, DatabaseQueryError> {
    use schema::user::dsl::*;
    Ok(user.select((id, name)).find(input_id).first::<User>(&self.connection).optional()?)
  }

  pub fn get_user_by_name<S: AsRef<str>>(&self, input_name: S) -> Result<Option<User>, DatabaseQueryError> {
    use schema::user::dsl::*;
    Ok(user.select((id, name)).filter(name.eq(input_name.as_ref())).first::<User>(&self.connection).optional()?)
  }

  pub fn verify_user(&self, user_login: &UserLogin) -> Result<Option<User>, UserAddVerifyError> {
    let internal_user: Option<InternalUser> = {
      use schema::user::dsl::*;
      user
        .filter(name.eq(&user_login.name))
        .first::<InternalUser>(&self.connection)
        .optional()?
    };
    if let Some(internal_user) = internal_user {
      if self.inner.password_hasher.verify(&user_login.password, &internal_user.salt, &internal_user.hash)? {
        Ok(Some(internal_user.into()))
      } else {
        Ok(None)
      }
    } else {
      Ok(None)
    }
  }

  pub fn create_user(&self, new_user: NewUser) -> Result<User, UserAddVerifyError> {
    use schema::user;
    let (hash, salt) = self.inner.password_hasher.hash_with_new_salt(&new_user.password)?;
    let internal_new_user = InternalNewUser {
      name: new_user.name.clone(),
      hash,
      salt,
    };
    event!(Level::DEBUG, name = %new_user.name, "Inserting user");
    time!("create_user.insert", diesel::insert_into(user::table)
      .values(internal_new_user)
      .execute(&self.connection)?);
    let select_query = user::table
      .select((user::id, user::name))
      .filter(user::name.eq(&new_user.name));
    Ok(time!("create_user.select_inserted", select_query.first::<User>(&self.connection)?))
  }

  pub fn delete_user_by_name<S: AsRef<str>>(&self, name: S) -> Result<bool, DatabaseQueryError> {
    use schema::user;
    let name = name.as_ref();
    let result = time!("delete_user_by_name.delete", diesel::delete(user::table.filter(user::name.eq(name)))
      .execute(&self.connection)?);
    Ok(result == 1)
  }

  pub fn delete_user_by_id(&self, input_id: i32) -> Result<bool, DatabaseQueryError> {
    use schema::user;
    let result = time!("delete_user_by_id.delete", diesel::delete(user::table.filter(user::id.eq(input_id)))
      .execute(&self.connection)?);
    Ok(result == 1)
  }
}
